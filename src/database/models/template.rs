use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateType {
    EmailAccountExists,
    EmailAppInstallLink,
    EmailResetPassword,
    EmailSignIn,
    EmailSignedConsent,
    EmailVerifyEmail,
    SmsAccountExists,
    SmsAppInstallLink,
    SmsPhoneSignIn,
    SmsResetPassword,
    SmsSignedConsent,
    SmsVerifyPhone,
}

impl TemplateType {
    pub const ALL: [TemplateType; 12] = [
        TemplateType::EmailAccountExists,
        TemplateType::EmailAppInstallLink,
        TemplateType::EmailResetPassword,
        TemplateType::EmailSignIn,
        TemplateType::EmailSignedConsent,
        TemplateType::EmailVerifyEmail,
        TemplateType::SmsAccountExists,
        TemplateType::SmsAppInstallLink,
        TemplateType::SmsPhoneSignIn,
        TemplateType::SmsResetPassword,
        TemplateType::SmsSignedConsent,
        TemplateType::SmsVerifyPhone,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateType::EmailAccountExists => "email_account_exists",
            TemplateType::EmailAppInstallLink => "email_app_install_link",
            TemplateType::EmailResetPassword => "email_reset_password",
            TemplateType::EmailSignIn => "email_sign_in",
            TemplateType::EmailSignedConsent => "email_signed_consent",
            TemplateType::EmailVerifyEmail => "email_verify_email",
            TemplateType::SmsAccountExists => "sms_account_exists",
            TemplateType::SmsAppInstallLink => "sms_app_install_link",
            TemplateType::SmsPhoneSignIn => "sms_phone_sign_in",
            TemplateType::SmsResetPassword => "sms_reset_password",
            TemplateType::SmsSignedConsent => "sms_signed_consent",
            TemplateType::SmsVerifyPhone => "sms_verify_phone",
        }
    }
}

impl fmt::Display for TemplateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TemplateType {
    type Err = String;

    /// Accepts both `email_sign_in` and `EMAIL_SIGN_IN`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        TemplateType::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| format!("'{}' is not a valid template type", s))
    }
}

/// A reusable message template. Templates are single-version: edits
/// overwrite in place under an optimistic lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    #[serde(default)]
    pub guid: String,
    #[serde(default, skip_serializing)]
    pub study_id: String,
    pub template_type: Option<TemplateType>,
    #[serde(default)]
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub created_on: DateTime<Utc>,
    #[serde(default)]
    pub modified_on: DateTime<Utc>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub version: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_type_parses_either_case() {
        assert_eq!("EMAIL_SIGN_IN".parse::<TemplateType>(), Ok(TemplateType::EmailSignIn));
        assert_eq!("sms_verify_phone".parse::<TemplateType>(), Ok(TemplateType::SmsVerifyPhone));
        assert!("fax_cover_sheet".parse::<TemplateType>().is_err());
    }

    #[test]
    fn as_str_agrees_with_serde() {
        for t in TemplateType::ALL {
            assert_eq!(serde_json::to_value(t).unwrap(), serde_json::json!(t.as_str()));
        }
    }
}
