//! Wire format. Every JSON object the API returns carries a `type` field
//! naming its model, and lists wrap their items in `ResourceList` or
//! `PagedResourceList`.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::database::models::{
    Account, AccountSummary, StudyConsent, StudyConsentView, Subpopulation, Template, UploadSchema,
};

/// A model with a fixed name in the `type` field
pub trait ApiObject: Serialize {
    const TYPE: &'static str;
}

impl ApiObject for UploadSchema {
    const TYPE: &'static str = "UploadSchema";
}

impl ApiObject for StudyConsent {
    const TYPE: &'static str = "StudyConsent";
}

impl ApiObject for StudyConsentView {
    const TYPE: &'static str = "StudyConsent";
}

impl ApiObject for Subpopulation {
    const TYPE: &'static str = "Subpopulation";
}

impl ApiObject for Template {
    const TYPE: &'static str = "Template";
}

impl ApiObject for Account {
    const TYPE: &'static str = "StudyParticipant";
}

impl ApiObject for AccountSummary {
    const TYPE: &'static str = "AccountSummary";
}

/// `value` serialized with its `type` field appended
#[derive(Debug, Serialize)]
pub struct Typed<T> {
    #[serde(flatten)]
    pub value: T,
    #[serde(rename = "type")]
    pub kind: &'static str,
}

impl<T: ApiObject> From<T> for Typed<T> {
    fn from(value: T) -> Self {
        Self { value, kind: T::TYPE }
    }
}

const TYPE_KEY: &str = "type";

/// Query parameters echoed back with a list
#[derive(Debug, Default, Clone)]
pub struct RequestParams(Map<String, Value>);

impl RequestParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// `type` names the object itself; a parameter echoed under that key is
    /// kept as `<key>Param` rather than lost.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        let key = if key == TYPE_KEY { format!("{}Param", key) } else { key.to_string() };
        self.0.insert(key, value.into());
        self
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for RequestParams {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut params = self.0.clone();
        params.insert(TYPE_KEY.to_string(), Value::from("RequestParams"));
        params.serialize(serializer)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceList<T> {
    pub items: Vec<T>,
    #[serde(skip_serializing_if = "RequestParams::is_empty")]
    pub request_params: RequestParams,
    #[serde(rename = "type")]
    kind: &'static str,
}

impl<T: ApiObject> ResourceList<Typed<T>> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items: items.into_iter().map(Typed::from).collect(),
            request_params: RequestParams::new(),
            kind: "ResourceList",
        }
    }
}

impl<T> ResourceList<T> {
    /// List of plain values such as identifiers, which carry no `type`
    pub fn of_values(items: Vec<T>) -> Self {
        Self {
            items,
            request_params: RequestParams::new(),
            kind: "ResourceList",
        }
    }

    pub fn with_param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.request_params = self.request_params.with(key, value);
        self
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PagedResourceList<T> {
    pub items: Vec<Typed<T>>,
    pub total: i64,
    pub request_params: RequestParams,
    #[serde(rename = "type")]
    kind: &'static str,
}

impl<T: ApiObject> PagedResourceList<T> {
    pub fn new(items: Vec<T>, total: i64) -> Self {
        Self {
            items: items.into_iter().map(Typed::from).collect(),
            total,
            request_params: RequestParams::new(),
            kind: "PagedResourceList",
        }
    }

    pub fn with_param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.request_params = self.request_params.with(key, value);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusMessage {
    pub message: String,
    #[serde(rename = "type")]
    kind: &'static str,
}

impl StatusMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: "StatusMessage",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuidVersionHolder {
    pub guid: String,
    pub version: i64,
    #[serde(rename = "type")]
    kind: &'static str,
}

impl GuidVersionHolder {
    pub fn new(guid: impl Into<String>, version: i64) -> Self {
        Self {
            guid: guid.into(),
            version,
            kind: "GuidVersionHolder",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentifierHolder {
    pub identifier: String,
    #[serde(rename = "type")]
    kind: &'static str,
}

impl IdentifierHolder {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            kind: "IdentifierHolder",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_schema;
    use serde_json::json;

    #[test]
    fn typed_object_gains_type_field() {
        let value = serde_json::to_value(Typed::from(sample_schema("s1"))).unwrap();
        assert_eq!(value["type"], "UploadSchema");
        assert_eq!(value["schemaId"], "s1");
        assert!(value.get("studyId").is_none());
    }

    #[test]
    fn resource_list_echoes_params_only_when_present() {
        let bare = serde_json::to_value(ResourceList::new(vec![sample_schema("s1")])).unwrap();
        assert_eq!(bare["type"], "ResourceList");
        assert_eq!(bare["items"][0]["type"], "UploadSchema");
        assert!(bare.get("requestParams").is_none());

        let with = serde_json::to_value(
            ResourceList::new(vec![sample_schema("s1")]).with_param("includeDeleted", true),
        )
        .unwrap();
        assert_eq!(
            with["requestParams"],
            json!({"includeDeleted": true, "type": "RequestParams"})
        );
    }

    #[test]
    fn echoed_type_filter_survives_alongside_object_type() {
        let params = RequestParams::new()
            .with("templateType", "email_sign_in")
            .with("type", "sms_verify_phone");
        let json = serde_json::to_value(params).unwrap();
        assert_eq!(json["templateType"], "email_sign_in");
        assert_eq!(json["typeParam"], "sms_verify_phone");
        assert_eq!(json["type"], "RequestParams");
    }

    #[test]
    fn holders_and_messages() {
        assert_eq!(
            serde_json::to_value(StatusMessage::new("Schemas have been deleted.")).unwrap(),
            json!({"message": "Schemas have been deleted.", "type": "StatusMessage"})
        );
        assert_eq!(
            serde_json::to_value(GuidVersionHolder::new("g", 2)).unwrap(),
            json!({"guid": "g", "version": 2, "type": "GuidVersionHolder"})
        );
        assert_eq!(
            serde_json::to_value(PagedResourceList::<AccountSummary>::new(vec![], 0)).unwrap()["type"],
            "PagedResourceList"
        );
    }
}
