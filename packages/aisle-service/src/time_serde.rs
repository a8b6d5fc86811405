use serde::{Deserialize, Deserializer, Serializer};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

pub fn serialize<S>(value: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
	S: Serializer,
{
	let formatted = value.format(&Rfc3339).map_err(serde::ser::Error::custom)?;

	serializer.serialize_str(&formatted)
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
where
	D: Deserializer<'de>,
{
	let raw = String::deserialize(deserializer)?;

	OffsetDateTime::parse(&raw, &Rfc3339).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
	use serde::Serialize;
	use time::macros::datetime;

	use super::*;

	#[derive(Deserialize, Serialize)]
	struct Stamp {
		#[serde(with = "super")]
		at: OffsetDateTime,
	}

	#[test]
	fn log_timestamps_round_trip_as_rfc3339() {
		let stamp = Stamp { at: datetime!(2026-08-25 12:30:45 UTC) };
		let json = serde_json::to_string(&stamp).expect("serialize failed");

		assert_eq!(json, r#"{"at":"2026-08-25T12:30:45Z"}"#);

		let back: Stamp = serde_json::from_str(&json).expect("deserialize failed");

		assert_eq!(back.at, stamp.at);
	}
}
