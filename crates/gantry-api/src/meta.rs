//! Management Message and Metadata Types
//!
//! Payload types for the system service's functions and the service
//! descriptions returned by `List`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload of the system `Transfer` function
///
/// `kind` is `"base64"` or `"text"` (compared case-insensitively by the
/// host). `content` holds the encoded file body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferMessage {
    pub filename: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
}

/// Payload of the system `Install` and `Uninstall` functions
///
/// Also the persisted addin record: the manifest is a JSON array of
/// these, rewritten wholesale on every change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallMessage {
    pub main_dll: String,
    #[serde(default)]
    pub filenames: Vec<String>,
}

impl InstallMessage {
    pub fn new(main_dll: impl Into<String>, filenames: Vec<String>) -> Self {
        Self {
            main_dll: main_dll.into(),
            filenames,
        }
    }
}

/// Declared shape of one function input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputMetaData {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    /// Element type for arrays, empty otherwise.
    #[serde(rename = "elementType", default)]
    pub element_type: String,
}

impl InputMetaData {
    /// Describe a scalar input
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            element_type: String::new(),
        }
    }

    /// Describe an array input with the given element type
    pub fn array(name: impl Into<String>, element_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: "Array".to_string(),
            element_type: element_type.into(),
        }
    }
}

/// Description of one registered function, as returned by `List`
///
/// `properties` carries the live call counters keyed by
/// [`crate::wire::stats`] names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionMetaData {
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<InputMetaData>,
    #[serde(default)]
    pub properties: serde_json::Map<String, Value>,
}

/// Description of one registered service, as returned by `List`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceMetaData {
    pub name: String,
    #[serde(default)]
    pub functions: Vec<FunctionMetaData>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_message_wire_names() {
        let msg = InstallMessage::new("utils.so", vec!["helper.so".to_string()]);
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"mainDll\":\"utils.so\""));
        assert!(json.contains("\"filenames\":[\"helper.so\"]"));
    }

    #[test]
    fn test_install_message_filenames_default() {
        let msg: InstallMessage = serde_json::from_str(r#"{"mainDll":"utils.so"}"#).unwrap();
        assert_eq!(msg.main_dll, "utils.so");
        assert!(msg.filenames.is_empty());
    }

    #[test]
    fn test_transfer_message_type_key() {
        let msg = TransferMessage {
            filename: "utils.so".to_string(),
            kind: "base64".to_string(),
            content: "AAAA".to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"base64\""));
        assert!(json.contains("\"filename\":\"utils.so\""));
    }

    #[test]
    fn test_input_metadata_element_type() {
        let scalar = InputMetaData::new("filename", "String");
        let json = serde_json::to_string(&scalar).unwrap();
        assert!(json.contains("\"elementType\":\"\""));

        let array = InputMetaData::array("filenames", "String");
        let json = serde_json::to_string(&array).unwrap();
        assert!(json.contains("\"type\":\"Array\""));
        assert!(json.contains("\"elementType\":\"String\""));
    }

    #[test]
    fn test_service_metadata_round_trip() {
        let mut properties = serde_json::Map::new();
        properties.insert("Count".to_string(), Value::from(0u64));
        properties.insert("Total".to_string(), Value::from(0.0));
        properties.insert("Result".to_string(), Value::from(""));

        let meta = ServiceMetaData {
            name: "Utils".to_string(),
            functions: vec![FunctionMetaData {
                name: "OpenCmd".to_string(),
                inputs: vec![],
                properties,
            }],
        };

        let json = serde_json::to_string(&meta).unwrap();
        assert!(json.contains("\"Count\":0"));

        let parsed: Vec<ServiceMetaData> =
            serde_json::from_str(&format!("[{}]", json)).unwrap();
        assert_eq!(parsed[0].name, "Utils");
        assert_eq!(parsed[0].functions[0].name, "OpenCmd");
    }
}
