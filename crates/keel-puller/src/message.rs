//! Line-delimited JSON pull progress, in the shape registries and the
//! Docker engine stream during `docker pull`.

use std::io::Write;

use serde::{Deserialize, Serialize};

/// One progress record in a pull stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonMessage {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status: String,
    /// Layer or image identifier the status refers to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Human-readable progress bar text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<String>,
    #[serde(
        rename = "progressDetail",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub progress_detail: Option<ProgressDetail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Numeric progress for a layer download.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
}

impl JsonMessage {
    pub fn status(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_progress(mut self, current: u64, total: u64) -> Self {
        self.progress_detail = Some(ProgressDetail {
            current: Some(current),
            total: Some(total),
        });
        self
    }
}

/// Encode one message as a single JSON line.
pub fn write_message(w: &mut (dyn Write + Send), msg: &JsonMessage) -> std::io::Result<()> {
    serde_json::to_writer(&mut *w, msg)?;
    w.write_all(b"\n")?;
    w.flush()
}

/// Decode every message in a captured stream.
pub fn read_messages(stream: &[u8]) -> serde_json::Result<Vec<JsonMessage>> {
    serde_json::Deserializer::from_slice(stream)
        .into_iter::<JsonMessage>()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_one_object_per_line() {
        let mut out: Vec<u8> = Vec::new();
        write_message(&mut out, &JsonMessage::status("Pulling repository acme/web")).unwrap();
        write_message(
            &mut out,
            &JsonMessage::status("Downloading")
                .with_id("a1dd7097a8e8")
                .with_progress(512, 2048),
        )
        .unwrap();

        let text = String::from_utf8(out.clone()).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("\"progressDetail\":{\"current\":512,\"total\":2048}"));

        let messages = read_messages(&out).unwrap();
        assert_eq!(messages[1].id.as_deref(), Some("a1dd7097a8e8"));
    }

    #[test]
    fn reads_engine_style_output() {
        let raw = br#"{"status":"Pulling fs layer","progressDetail":{},"id":"345c7524bc96"}
{"status":"Status: Image is up to date for acme/web:latest"}
"#;
        let messages = read_messages(raw).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].progress_detail, Some(ProgressDetail::default()));
        assert!(messages[1].id.is_none());
    }
}
