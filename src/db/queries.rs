pub const CREATE_WAYPOINTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS waypoints (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    topic TEXT NOT NULL,
    latitude DOUBLE NOT NULL,
    longitude DOUBLE NOT NULL,
    time INTEGER NOT NULL,
    CONSTRAINT waypoints_unique UNIQUE (topic, latitude, longitude, time)
);
"#;

pub const CREATE_TOPIC_TIME_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS waypoints_topic_time ON waypoints (topic, time);
"#;

pub const INSERT_WAYPOINT: &str = r#"
INSERT INTO waypoints (topic, latitude, longitude, time)
VALUES (?, ?, ?, ?);
"#;

pub const SELECT_WAYPOINTS_IN_RANGE: &str = r#"
SELECT id, topic, latitude, longitude, time
FROM waypoints
WHERE topic = ? AND time >= ? AND time <= ?
ORDER BY time ASC, id ASC
LIMIT ?;
"#;

pub const SELECT_TOPICS: &str = r#"
SELECT DISTINCT topic FROM waypoints;
"#;
