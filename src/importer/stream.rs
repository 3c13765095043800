//! Forward-only decoding of the `locations` array of an export file.
//!
//! The top-level object is walked with a map visitor; the array itself is consumed one
//! element at a time and every decoded record is handed to a bounded channel, so memory
//! use does not grow with the length of the array.

use serde::de::{self, DeserializeSeed, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use std::fmt;
use std::io::Read;
use tokio::sync::mpsc::Sender;

use crate::models::timeline::{LocationRecord, TimelineLocation};

const LOCATIONS_KEY: &str = "locations";

/// Decodes `reader` and sends every location to `sink`. Blocks while the channel is full,
/// so it must run on a blocking thread. Returns the number of records sent.
pub fn decode_locations<R: Read>(
    reader: R,
    sink: &Sender<TimelineLocation>,
) -> Result<usize, serde_json::Error> {
    let mut de = serde_json::Deserializer::from_reader(reader);
    let count = (&mut de).deserialize_map(ExportVisitor { sink })?;
    de.end()?;
    Ok(count)
}

struct ExportVisitor<'a> {
    sink: &'a Sender<TimelineLocation>,
}

impl<'de, 'a> Visitor<'de> for ExportVisitor<'a> {
    type Value = usize;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an object with a `locations` array")
    }

    fn visit_map<A>(self, mut map: A) -> Result<usize, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut count = None;
        while let Some(key) = map.next_key::<String>()? {
            if key == LOCATIONS_KEY && count.is_none() {
                count = Some(map.next_value_seed(LocationsSeed { sink: self.sink })?);
            } else {
                map.next_value::<IgnoredAny>()?;
            }
        }
        count.ok_or_else(|| de::Error::missing_field(LOCATIONS_KEY))
    }
}

struct LocationsSeed<'a> {
    sink: &'a Sender<TimelineLocation>,
}

impl<'de, 'a> DeserializeSeed<'de> for LocationsSeed<'a> {
    type Value = usize;

    fn deserialize<D>(self, deserializer: D) -> Result<usize, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_seq(self)
    }
}

impl<'de, 'a> Visitor<'de> for LocationsSeed<'a> {
    type Value = usize;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an array of location records")
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<usize, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut count = 0;
        while let Some(record) = seq.next_element::<LocationRecord>()? {
            let location = record.into_location().map_err(|e| {
                <A::Error as de::Error>::custom(format!("record {}: {}", count + 1, e))
            })?;
            if self.sink.blocking_send(location).is_err() {
                return Err(de::Error::custom("import writer stopped"));
            }
            count += 1;
        }
        Ok(count)
    }
}
