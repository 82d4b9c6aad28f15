use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Per-thread window description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadInfo {
    pub id: u32,
    #[serde(rename = "winW", default)]
    pub win_w: u32,
    #[serde(rename = "winH", default)]
    pub win_h: u32,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ThreadInfo {
    pub fn new(id: u32, win_w: u32, win_h: u32) -> Self {
        Self {
            id,
            win_w,
            win_h,
            extra: Map::new(),
        }
    }
}

/// Input a tool consumed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionInput {
    pub md5: String,
    pub file: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionChange {
    pub from: u32,
    pub to: u32,
}

/// One entry of the provenance log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversion {
    pub tool: String,
    pub timestamp: String,
    pub version: String,
    pub input: ConversionInput,
    #[serde(rename = "versionInfo", default, skip_serializing_if = "Option::is_none")]
    pub version_info: Option<VersionChange>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The JSON block stored after the header
///
/// Unknown keys survive a read-modify-write cycle. The conversions log can only
/// be appended to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(rename = "defaultTid", default)]
    pub default_tid: u32,
    #[serde(default)]
    pub threads: Vec<ThreadInfo>,
    #[serde(rename = "frameCnt", default)]
    pub frame_count: u64,
    #[serde(rename = "callCnt", default)]
    pub call_count: u64,
    #[serde(default)]
    conversions: Vec<Conversion>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            default_tid: 0,
            threads: Vec::new(),
            frame_count: 0,
            call_count: 0,
            conversions: Vec::new(),
            extra: Map::new(),
        }
    }
}

impl Metadata {
    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        if bytes.iter().all(|b| b.is_ascii_whitespace() || *b == 0) {
            return Ok(Self::default());
        }
        serde_json::from_slice(bytes)
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn conversions(&self) -> &[Conversion] {
        &self.conversions
    }

    /// Append to the provenance log
    pub fn record_conversion(&mut self, conversion: Conversion) {
        self.conversions.push(conversion);
    }

    pub fn thread_mut(&mut self, id: u32) -> Option<&mut ThreadInfo> {
        self.threads.iter_mut().find(|t| t.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "defaultTid": 2,
        "threads": [{"id": 2, "winW": 1920, "winH": 1080, "eglConfig": {"red": 8}}],
        "frameCnt": 5,
        "callCnt": 300,
        "conversions": [{
            "tool": "trim",
            "timestamp": "2024-01-01T00:00:00+00:00",
            "version": "0.1.0",
            "input": {"md5": "abc", "file": "in.pat"}
        }],
        "glesVersion": 3
    }"#;

    #[test]
    fn test_parse_known_keys() {
        let meta = Metadata::from_json(SAMPLE.as_bytes()).unwrap();
        assert_eq!(meta.default_tid, 2);
        assert_eq!(meta.threads[0].win_w, 1920);
        assert_eq!(meta.frame_count, 5);
        assert_eq!(meta.call_count, 300);
        assert_eq!(meta.conversions().len(), 1);
        assert_eq!(meta.conversions()[0].input.file, "in.pat");
    }

    #[test]
    fn test_unknown_keys_survive() {
        let meta = Metadata::from_json(SAMPLE.as_bytes()).unwrap();
        let again = Metadata::from_json(&meta.to_json().unwrap()).unwrap();
        assert_eq!(again, meta);
        assert_eq!(again.extra["glesVersion"], 3);
        assert!(again.threads[0].extra.contains_key("eglConfig"));
    }

    #[test]
    fn test_empty_region_is_default() {
        assert_eq!(Metadata::from_json(&[0, 0, 0]).unwrap(), Metadata::default());
        assert_eq!(Metadata::from_json(b"").unwrap(), Metadata::default());
    }

    #[test]
    fn test_conversions_only_grow() {
        let mut meta = Metadata::from_json(SAMPLE.as_bytes()).unwrap();
        let first = meta.conversions()[0].clone();
        meta.record_conversion(Conversion {
            tool: "remap-tid".into(),
            timestamp: "2024-01-02T00:00:00+00:00".into(),
            version: "0.1.0".into(),
            input: ConversionInput {
                md5: "def".into(),
                file: "t.pat".into(),
            },
            version_info: None,
            extra: Map::new(),
        });
        assert_eq!(meta.conversions().len(), 2);
        assert_eq!(meta.conversions()[0], first);
    }
}
