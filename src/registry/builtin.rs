//! Built-in tool catalogue, used when the config lists no tools.
//!
//! Five tools live behind the document-processing container; image analysis
//! runs on the `vision` capability server.

use std::collections::{BTreeMap, BTreeSet};

use super::types::{ParameterSpec, ToolDescriptor, TransportBinding};

pub const PDF_FULL_EXTRACTION: &str = "pdf_full_extraction";
pub const SPREADSHEET_ANALYSIS: &str = "spreadsheet_analysis";
pub const IMAGE_ANALYSIS: &str = "image_analysis";
pub const TEXT_ANALYSIS: &str = "text_analysis";
pub const VIDEO_ANALYSIS: &str = "video_analysis";
pub const AUDIO_TRANSCRIPTION: &str = "audio_transcription";

/// Capability server that hosts the image tool.
pub const VISION_SERVER: &str = "vision";

/// Default confidence threshold for detection-style tools.
pub const DEFAULT_CONFIDENCE: f64 = 0.2;

fn container_tool(
    id: &str,
    description: &str,
    capabilities: &[&str],
    accepted: &[&str],
    path: &str,
    parameters: BTreeMap<String, ParameterSpec>,
) -> ToolDescriptor {
    ToolDescriptor {
        id: id.to_string(),
        description: description.to_string(),
        capabilities: capabilities.iter().map(|c| c.to_string()).collect::<BTreeSet<_>>(),
        accepted_input_types: accepted.iter().map(|t| t.to_string()).collect(),
        default_parameters: parameters,
        transport: TransportBinding::ContainerHttp {
            endpoint: String::new(),
            path: path.to_string(),
        },
    }
}

fn confidence_parameter() -> BTreeMap<String, ParameterSpec> {
    BTreeMap::from([(
        "confidence".to_string(),
        ParameterSpec::bounded(DEFAULT_CONFIDENCE, 0.0, 1.0),
    )])
}

/// The default catalogue. Container endpoints are left empty for the
/// registry to fill from `container.endpoint`.
pub fn default_catalogue() -> Vec<ToolDescriptor> {
    vec![
        container_tool(
            PDF_FULL_EXTRACTION,
            "Extract text, tables, and embedded images from PDF documents",
            &["text_extraction", "table_extraction", "image_extraction", "ocr"],
            &["application/pdf"],
            "/pdf/extract-all",
            confidence_parameter(),
        ),
        container_tool(
            SPREADSHEET_ANALYSIS,
            "Summarize and analyze spreadsheet and CSV data",
            &["tabular_analysis", "statistics"],
            &[
                "text/csv",
                "application/vnd.ms-excel",
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            ],
            "/spreadsheet/analyze",
            BTreeMap::from([(
                "max_rows".to_string(),
                ParameterSpec::new(serde_json::json!(1000)),
            )]),
        ),
        container_tool(
            TEXT_ANALYSIS,
            "Summarize and extract entities from plain text and word documents",
            &["summarization", "entity_extraction"],
            &[
                "text/plain",
                "text/markdown",
                "application/msword",
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            ],
            "/text/analyze",
            BTreeMap::new(),
        ),
        container_tool(
            VIDEO_ANALYSIS,
            "Sample frames and describe scenes in video files",
            &["scene_detection", "frame_sampling"],
            &["video/*"],
            "/video/analyze",
            BTreeMap::from([(
                "frame_interval_secs".to_string(),
                ParameterSpec::bounded(5.0, 1.0, 60.0),
            )]),
        ),
        container_tool(
            AUDIO_TRANSCRIPTION,
            "Transcribe speech in audio files",
            &["transcription", "speech_to_text"],
            &["audio/*"],
            "/audio/transcribe",
            BTreeMap::from([(
                "language".to_string(),
                ParameterSpec::new(serde_json::json!("auto")),
            )]),
        ),
        ToolDescriptor {
            id: IMAGE_ANALYSIS.to_string(),
            description: "Detect and label objects in images".to_string(),
            capabilities: ["object_detection", "image_labeling"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            accepted_input_types: vec!["image/*".to_string()],
            default_parameters: confidence_parameter(),
            transport: TransportBinding::CapabilityServer {
                server_name: VISION_SERVER.to_string(),
            },
        },
    ]
}
