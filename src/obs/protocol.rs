//! obs-websocket v5 message types
//!
//! Every message is `{"op": <opcode>, "d": <payload>}`. Only the opcodes a
//! request/response client needs are modelled here.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// RPC version this client speaks
pub const RPC_VERSION: u32 = 1;

/// Message opcodes
pub mod op {
    pub const HELLO: u8 = 0;
    pub const IDENTIFY: u8 = 1;
    pub const IDENTIFIED: u8 = 2;
    pub const REQUEST: u8 = 6;
    pub const REQUEST_RESPONSE: u8 = 7;
}

/// Outer message frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub op: u8,
    pub d: Value,
}

impl Envelope {
    /// Wrap a payload with its opcode
    pub fn new<T: Serialize>(op: u8, payload: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            op,
            d: serde_json::to_value(payload)?,
        })
    }

    /// Decode the payload
    pub fn payload<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.d.clone())
    }
}

/// First message from the server
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hello {
    pub obs_web_socket_version: String,
    pub rpc_version: u32,
    pub authentication: Option<AuthChallenge>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthChallenge {
    pub challenge: String,
    pub salt: String,
}

/// Client answer to Hello
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identify {
    pub rpc_version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication: Option<String>,
    /// Event subscription bitmask; 0 since this client only sends requests
    pub event_subscriptions: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identified {
    pub negotiated_rpc_version: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub request_type: String,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_data: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestResponse {
    pub request_type: String,
    pub request_id: String,
    pub request_status: RequestStatus,
    #[serde(default)]
    pub response_data: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestStatus {
    pub result: bool,
    pub code: u16,
    #[serde(default)]
    pub comment: Option<String>,
}

/// `GetVersion` response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub obs_version: String,
    pub obs_web_socket_version: String,
}

/// `GetSceneList` response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneList {
    #[serde(default)]
    pub current_program_scene_name: Option<String>,
    pub scenes: Vec<SceneItem>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneItem {
    pub scene_name: String,
    #[serde(default)]
    pub scene_index: i64,
}

/// `GetCurrentProgramScene` response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentProgramScene {
    pub current_program_scene_name: String,
}

/// Compute the Identify authentication string
///
/// `base64(sha256(base64(sha256(password + salt)) + challenge))`
pub fn auth_response(password: &str, challenge: &AuthChallenge) -> String {
    let secret = STANDARD.encode(Sha256::digest(
        format!("{}{}", password, challenge.salt).as_bytes(),
    ));
    STANDARD.encode(Sha256::digest(
        format!("{}{}", secret, challenge.challenge).as_bytes(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_auth_response() {
        let challenge = AuthChallenge {
            challenge: "+IxH4CnCiqpX1rM9scsNynZzbOe4KhDeYcTNS3PDaeY=".to_string(),
            salt: "lM1GncleQOaCu9lT1yeUZhFYnqhsLLP1G5lAGo3ixaI=".to_string(),
        };
        assert_eq!(
            auth_response("supersecretpassword", &challenge),
            "1Ct943GAT+6YQUUX47Ia/ncufilbe6+oD6lY+5kaCu4="
        );
    }

    #[test]
    fn test_parse_hello_with_auth() {
        let text = r#"{"op":0,"d":{"obsWebSocketVersion":"5.1.0","rpcVersion":1,
            "authentication":{"challenge":"abc","salt":"def"}}}"#;
        let envelope: Envelope = serde_json::from_str(text).unwrap();
        assert_eq!(envelope.op, op::HELLO);

        let hello: Hello = envelope.payload().unwrap();
        assert_eq!(hello.rpc_version, 1);
        let auth = hello.authentication.unwrap();
        assert_eq!(auth.challenge, "abc");
        assert_eq!(auth.salt, "def");
    }

    #[test]
    fn test_parse_hello_without_auth() {
        let text = r#"{"op":0,"d":{"obsWebSocketVersion":"5.1.0","rpcVersion":1}}"#;
        let hello: Hello = serde_json::from_str::<Envelope>(text).unwrap().payload().unwrap();
        assert!(hello.authentication.is_none());
    }

    #[test]
    fn test_identify_serialization() {
        let identify = Identify {
            rpc_version: RPC_VERSION,
            authentication: None,
            event_subscriptions: 0,
        };
        let value = serde_json::to_value(Envelope::new(op::IDENTIFY, &identify).unwrap()).unwrap();
        assert_eq!(value, json!({"op": 1, "d": {"rpcVersion": 1, "eventSubscriptions": 0}}));
    }

    #[test]
    fn test_request_serialization() {
        let request = Request {
            request_type: "SetCurrentProgramScene".to_string(),
            request_id: "3".to_string(),
            request_data: Some(json!({"sceneName": "Cam8"})),
        };
        let value = serde_json::to_value(Envelope::new(op::REQUEST, &request).unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"op": 6, "d": {
                "requestType": "SetCurrentProgramScene",
                "requestId": "3",
                "requestData": {"sceneName": "Cam8"}
            }})
        );
    }

    #[test]
    fn test_parse_scene_list_response() {
        let text = r#"{"op":7,"d":{"requestType":"GetSceneList","requestId":"1",
            "requestStatus":{"result":true,"code":100},
            "responseData":{"currentProgramSceneName":"Main","currentPreviewSceneName":null,
            "scenes":[{"sceneIndex":0,"sceneName":"Main"},{"sceneIndex":1,"sceneName":"看台"}]}}}"#;
        let response: RequestResponse =
            serde_json::from_str::<Envelope>(text).unwrap().payload().unwrap();
        assert!(response.request_status.result);
        assert_eq!(response.request_status.code, 100);

        let list: SceneList = serde_json::from_value(response.response_data.unwrap()).unwrap();
        let names: Vec<_> = list.scenes.iter().map(|s| s.scene_name.as_str()).collect();
        assert_eq!(names, vec!["Main", "看台"]);
        assert_eq!(list.current_program_scene_name.as_deref(), Some("Main"));
    }

    #[test]
    fn test_parse_failed_response() {
        let text = r#"{"op":7,"d":{"requestType":"SetCurrentProgramScene","requestId":"2",
            "requestStatus":{"result":false,"code":600,"comment":"No source was found by the name of `Nope`."}}}"#;
        let response: RequestResponse =
            serde_json::from_str::<Envelope>(text).unwrap().payload().unwrap();
        assert!(!response.request_status.result);
        assert_eq!(response.request_status.code, 600);
        assert!(response.response_data.is_none());
    }
}
