use anyhow::Result;
use geo_types::Point;
use gpx::{Gpx, GpxVersion, Track, TrackSegment};
use time::OffsetDateTime;

use crate::models::waypoint::Waypoint;

const CREATOR: &str = "location-history";

/// Builds a GPX 1.1 document holding the waypoints as a single track segment, in the given order.
pub fn build_gpx(waypoints: &[Waypoint]) -> Result<Gpx> {
    let mut segment = TrackSegment::new();
    for wp in waypoints {
        let mut point = gpx::Waypoint::new(Point::new(wp.longitude, wp.latitude));
        point.time = Some(OffsetDateTime::from_unix_timestamp(wp.datetime.timestamp())?.into());
        segment.points.push(point);
    }

    let mut track = Track::new();
    track.segments.push(segment);

    Ok(Gpx {
        version: GpxVersion::Gpx11,
        creator: Some(CREATOR.to_string()),
        tracks: vec![track],
        ..Default::default()
    })
}

pub fn to_xml(document: &Gpx) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    gpx::write(document, &mut buf)?;
    Ok(buf)
}
