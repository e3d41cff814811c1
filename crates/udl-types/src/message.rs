//! Transaction messages.
//!
//! A message is a closed set of payload kinds, each identified on the wire by
//! an explicit application tag byte. The encoded form is `(tag, payload
//! bytes)`, so a tag unknown to this version decodes to a distinct error
//! instead of being misread as another payload.

use serde::de::Error as _;
use serde::ser::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use udl_crypto::codec;

use crate::address::Address;
use crate::error::{TypeError, TypeResult};
use crate::hash::Hash;
use crate::property::GlobalProperty;
use crate::transaction::{Input, Output};

/// Application tag bytes.
pub mod app {
    pub const PAYMENT: u8 = 0x01;
    pub const CONTRACT_TEMPLATE: u8 = 0x02;
    pub const CONTRACT_DEPLOY: u8 = 0x03;
    pub const CONTRACT_INVOKE: u8 = 0x04;
    pub const CONFIG: u8 = 0x05;
    pub const TEXT: u8 = 0x06;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    Payment(PaymentPayload),
    ContractTemplateDeploy(ContractTemplatePayload),
    ContractDeploy(ContractDeployPayload),
    ContractInvoke(ContractInvokePayload),
    ConfigUpdate(ConfigPayload),
    Text(TextPayload),
}

impl Message {
    pub fn app_tag(&self) -> u8 {
        match self {
            Message::Payment(_) => app::PAYMENT,
            Message::ContractTemplateDeploy(_) => app::CONTRACT_TEMPLATE,
            Message::ContractDeploy(_) => app::CONTRACT_DEPLOY,
            Message::ContractInvoke(_) => app::CONTRACT_INVOKE,
            Message::ConfigUpdate(_) => app::CONFIG,
            Message::Text(_) => app::TEXT,
        }
    }

    pub fn as_payment(&self) -> Option<&PaymentPayload> {
        match self {
            Message::Payment(p) => Some(p),
            _ => None,
        }
    }

    /// Encode the payload alone, without its tag.
    pub fn payload_bytes(&self) -> TypeResult<Vec<u8>> {
        let bytes = match self {
            Message::Payment(p) => codec::encode(p)?,
            Message::ContractTemplateDeploy(p) => codec::encode(p)?,
            Message::ContractDeploy(p) => codec::encode(p)?,
            Message::ContractInvoke(p) => codec::encode(p)?,
            Message::ConfigUpdate(p) => codec::encode(p)?,
            Message::Text(p) => codec::encode(p)?,
        };
        Ok(bytes)
    }

    /// Decode a payload given its application tag.
    pub fn from_tagged(app: u8, payload: &[u8]) -> TypeResult<Self> {
        let message = match app {
            app::PAYMENT => Message::Payment(codec::decode(payload)?),
            app::CONTRACT_TEMPLATE => Message::ContractTemplateDeploy(codec::decode(payload)?),
            app::CONTRACT_DEPLOY => Message::ContractDeploy(codec::decode(payload)?),
            app::CONTRACT_INVOKE => Message::ContractInvoke(codec::decode(payload)?),
            app::CONFIG => Message::ConfigUpdate(codec::decode(payload)?),
            app::TEXT => Message::Text(codec::decode(payload)?),
            other => return Err(TypeError::UnknownMessageTag(other)),
        };
        Ok(message)
    }
}

#[derive(Serialize, Deserialize)]
struct TaggedMessage {
    app: u8,
    payload: Vec<u8>,
}

impl Serialize for Message {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let payload = self.payload_bytes().map_err(S::Error::custom)?;
        TaggedMessage {
            app: self.app_tag(),
            payload,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Message {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tagged = TaggedMessage::deserialize(deserializer)?;
        Message::from_tagged(tagged.app, &tagged.payload).map_err(D::Error::custom)
    }
}

/// Value transfer: spends outputs and creates new ones.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentPayload {
    pub inputs: Vec<Input>,
    pub outputs: Vec<Output>,
}

impl PaymentPayload {
    /// Coinbase payments have exactly one input that spends nothing.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].previous_out_point.is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractTemplatePayload {
    pub name: String,
    pub bytecode: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractDeployPayload {
    /// Hash of the transaction that deployed the template.
    pub template_id: Hash,
    pub contract_id: Address,
    pub name: String,
    pub args: Vec<Vec<u8>>,
}

/// Call into a deployed contract. Bridges reach the ledger only through these.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractInvokePayload {
    pub contract_id: Address,
    pub function: String,
    pub args: Vec<Vec<u8>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub key: String,
    pub value: Vec<u8>,
    pub is_delete: bool,
}

/// Governance update. A carried [`GlobalProperty`] replaces the current one.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigPayload {
    pub global_property: Option<GlobalProperty>,
    pub entries: Vec<ConfigEntry>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextPayload {
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_kinds() -> Vec<Message> {
        vec![
            Message::Payment(PaymentPayload::default()),
            Message::ContractTemplateDeploy(ContractTemplatePayload {
                name: "escrow".into(),
                bytecode: vec![0, 1, 2],
            }),
            Message::ContractDeploy(ContractDeployPayload {
                template_id: Hash::from_digest([1; 32]),
                contract_id: Address::from_bytes([2; 20]),
                name: "escrow-1".into(),
                args: vec![b"a".to_vec()],
            }),
            Message::ContractInvoke(ContractInvokePayload {
                contract_id: Address::from_bytes([2; 20]),
                function: "release".into(),
                args: vec![],
            }),
            Message::ConfigUpdate(ConfigPayload::default()),
            Message::Text(TextPayload {
                text: "hello".into(),
            }),
        ]
    }

    #[test]
    fn tags_are_distinct_and_stable() {
        let tags: Vec<u8> = all_kinds().iter().map(Message::app_tag).collect();
        assert_eq!(tags, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn every_kind_survives_the_codec() {
        for message in all_kinds() {
            let bytes = codec::encode(&message).unwrap();
            assert_eq!(bytes[0], message.app_tag());
            let decoded: Message = codec::decode(&bytes).unwrap();
            assert_eq!(decoded, message);
        }
    }

    #[test]
    fn unknown_tag_is_a_distinct_error() {
        let result = Message::from_tagged(0x7f, &[]);
        assert_eq!(result, Err(TypeError::UnknownMessageTag(0x7f)));

        let bytes = codec::encode(&TaggedMessage {
            app: 0x7f,
            payload: vec![],
        })
        .unwrap();
        let decoded: Result<Message, _> = codec::decode(&bytes);
        assert!(decoded.is_err());
    }

    #[test]
    fn coinbase_detection() {
        let coinbase = PaymentPayload {
            inputs: vec![Input::coinbase(vec![])],
            outputs: vec![],
        };
        assert!(coinbase.is_coinbase());
        assert!(!PaymentPayload::default().is_coinbase());
    }
}
