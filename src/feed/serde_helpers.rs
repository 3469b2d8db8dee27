use chrono::{DateTime, Utc};
use serde::de::Deserializer;
use serde::Deserialize;

/// POSIX timestamps in JSON feeds sometimes carry fractional seconds.
pub fn deserialize_option_unix_date<'de, D>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let secs: Option<f64> = Deserialize::deserialize(deserializer)?;
    secs.map(|secs| {
        DateTime::<Utc>::from_timestamp(secs as i64, 0)
            .ok_or_else(|| serde::de::Error::custom("Invalid timestamp"))
    })
    .transpose()
}

/// Repeated protobuf fields rendered as JSON appear as a bare object when
/// there is a single element.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Many<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> From<Many<T>> for Vec<T> {
    fn from(from: Many<T>) -> Self {
        match from {
            Many::One(val) => vec![val],
            Many::Many(vec) => vec,
        }
    }
}

impl<T> IntoIterator for Many<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        let vec: Vec<T> = self.into();
        vec.into_iter()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn many_accepts_one_or_many() {
        let one: Many<i32> = serde_json::from_str("3").unwrap();
        assert_eq!(Vec::from(one), vec![3]);

        let many: Many<i32> = serde_json::from_str("[1, 2]").unwrap();
        assert_eq!(Vec::from(many), vec![1, 2]);
    }

    #[test]
    fn unix_date_accepts_fractional_seconds() {
        #[derive(Deserialize)]
        struct T {
            #[serde(default, deserialize_with = "deserialize_option_unix_date")]
            timestamp: Option<DateTime<Utc>>,
        }

        let t: T = serde_json::from_str(r#"{"timestamp": 1707115806.588}"#).unwrap();
        assert_eq!(t.timestamp.unwrap().timestamp(), 1707115806);

        let t: T = serde_json::from_str("{}").unwrap();
        assert_eq!(t.timestamp, None);
    }
}
