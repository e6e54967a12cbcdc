use std::collections::HashMap;
use std::fmt::Write as _;

use rand::Rng;

use super::VariableSource;

const NAMESPACE: &str = "random.";

/// Bytes behind one `random.string` draw (128 bits).
const STRING_BYTES: usize = 16;

const KEYS: &[&str] = &["int", "byte", "long", "string"];

/// Fresh random values under `random.`.
///
/// Every lookup is a new draw from the thread-local CSPRNG; nothing is
/// cached, so `${random.int}` differs between two resolutions.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomSource;

impl RandomSource {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn draw(key: &str) -> Option<String> {
        let mut rng = rand::thread_rng();
        let value = match key {
            "int" => rng.gen::<i32>().to_string(),
            "byte" => rng.gen::<i8>().to_string(),
            "long" => rng.gen::<i64>().to_string(),
            "string" => {
                let bytes: [u8; STRING_BYTES] = rng.gen();
                bytes.iter().fold(String::with_capacity(STRING_BYTES * 2), |mut s, b| {
                    let _ = write!(s, "{b:02x}");
                    s
                })
            }
            _ => return None,
        };
        Some(value)
    }
}

impl VariableSource for RandomSource {
    fn namespace(&self) -> &str {
        NAMESPACE
    }

    fn produce_entries(&self) -> HashMap<String, String> {
        KEYS.iter()
            .filter_map(|k| Self::draw(k).map(|v| (format!("{NAMESPACE}{k}"), v)))
            .collect()
    }

    fn lookup(&self, key: &str) -> Option<String> {
        Self::draw(key.strip_prefix(NAMESPACE)?)
    }
}
