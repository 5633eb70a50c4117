//! Key/value formatting for finding messages

/// Renders keys and values for human-readable findings
///
/// Formatting never influences which defects are detected.
pub trait KeyValueStringer: Send + Sync {
    /// Render a key
    fn key_to_string(&self, key: &[u8]) -> String;
    /// Render a value
    fn value_to_string(&self, value: &[u8]) -> String;
}

/// Renders both keys and values as lowercase hex
#[derive(Debug, Clone, Copy, Default)]
pub struct HexKeyValueStringer;

impl KeyValueStringer for HexKeyValueStringer {
    fn key_to_string(&self, key: &[u8]) -> String {
        hex::encode(key)
    }

    fn value_to_string(&self, value: &[u8]) -> String {
        hex::encode(value)
    }
}
