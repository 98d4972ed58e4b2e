//! The answer envelope returned to callers and the transcription payload.

use serde::{Deserialize, Serialize};

use crate::geometry::Polygon;
use crate::page::TextLine;
use crate::region::Region;

/// Recognized text, confidence and outline for one text line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineTranscription {
    pub text: String,
    pub confidence: f32,
    pub polygon: Polygon,
    pub line_id: u32,
}

impl LineTranscription {
    /// Builds a transcription from an engine line, clamping the confidence to `[0, 1]`.
    pub fn from_text_line(line: TextLine, line_id: u32) -> Self {
        Self {
            text: line.text,
            confidence: clamp_confidence(line.confidence),
            polygon: line.polygon,
            line_id,
        }
    }
}

/// Transcriptions for one requested region, in input order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionTranscription {
    pub region: Region,
    pub lines: Vec<LineTranscription>,
}

impl RegionTranscription {
    /// A region that produced no lines (degenerate or blank).
    pub fn empty(region: Region) -> Self {
        Self {
            region,
            lines: Vec::new(),
        }
    }
}

/// Static provenance of the recognition engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrEngineInfo {
    pub name: String,
    pub code_version: String,
    pub model_version: String,
}

impl OcrEngineInfo {
    /// Creates engine provenance metadata.
    pub fn new(
        name: impl Into<String>,
        code_version: impl Into<String>,
        model_version: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            code_version: code_version.into(),
            model_version: model_version.into(),
        }
    }
}

/// Successful transcription of a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrResult {
    pub ocr_engine: OcrEngineInfo,
    pub transcriptions: Vec<RegionTranscription>,
}

/// Exactly one of `{"error": ...}` or `{"result": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Answer<T> {
    Error(String),
    Result(T),
}

/// The answer returned by `transcribe`.
pub type OcrAnswer = Answer<OcrResult>;

impl<T> Answer<T> {
    /// Creates an error answer.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }

    /// Returns `true` for an error answer.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Returns the error message, if any.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Error(message) => Some(message),
            Self::Result(_) => None,
        }
    }

    /// Returns the result, if any.
    pub fn result(&self) -> Option<&T> {
        match self {
            Self::Error(_) => None,
            Self::Result(result) => Some(result),
        }
    }

    /// Converts into a standard `Result`.
    pub fn into_result(self) -> Result<T, String> {
        match self {
            Self::Error(message) => Err(message),
            Self::Result(result) => Ok(result),
        }
    }
}

impl<T> From<crate::Result<T>> for Answer<T> {
    fn from(result: crate::Result<T>) -> Self {
        match result {
            Ok(value) => Self::Result(value),
            Err(error) => Self::Error(error.message_or_kind().to_owned()),
        }
    }
}

fn clamp_confidence(confidence: f32) -> f32 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::Error;

    fn sample_result() -> OcrResult {
        OcrResult {
            ocr_engine: OcrEngineInfo::new("pero", "0.1.0", "2022-09-26"),
            transcriptions: vec![RegionTranscription {
                region: Region::new(0.0, 0.0, 100.0, 100.0),
                lines: vec![LineTranscription {
                    text: "hello".into(),
                    confidence: 0.9,
                    polygon: Polygon::rect(0.0, 0.0, 50.0, 10.0),
                    line_id: 0,
                }],
            }],
        }
    }

    #[test]
    fn error_answer_wire_format() {
        let answer: OcrAnswer = Answer::error("boom");
        assert_eq!(serde_json::to_value(&answer).unwrap(), json!({"error": "boom"}));
    }

    #[test]
    fn result_answer_wire_format() {
        let answer = Answer::Result(sample_result());
        let value = serde_json::to_value(&answer).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 1);
        assert_eq!(value["result"]["ocr_engine"]["name"], "pero");
        assert_eq!(value["result"]["transcriptions"][0]["lines"][0]["line_id"], 0);
        assert_eq!(value["result"]["transcriptions"][0]["region"]["xbr"], 100.0);
    }

    #[test]
    fn rejects_both_or_neither() {
        let both = json!({"error": "x", "result": null});
        assert!(serde_json::from_value::<OcrAnswer>(both).is_err());
        assert!(serde_json::from_value::<OcrAnswer>(json!({})).is_err());
    }

    #[test]
    fn from_core_result() {
        let answer: Answer<u32> = Err(Error::timeout().with_message("too slow")).into();
        assert_eq!(answer.error_message(), Some("too slow"));
        let answer: Answer<u32> = Ok(3).into();
        assert_eq!(answer.result(), Some(&3));
    }

    #[test]
    fn confidence_is_clamped() {
        let line = TextLine::new("x", 1.7, Polygon::default());
        assert_eq!(LineTranscription::from_text_line(line, 4).confidence, 1.0);
        let line = TextLine::new("x", f32::NAN, Polygon::default());
        assert_eq!(LineTranscription::from_text_line(line, 4).confidence, 0.0);
    }
}
