//! user type and the oidc claims that create one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// standard oidc claims extracted from the id token during login.
///
/// stored verbatim on the user row; [`UserClaims::subject`] is the stable
/// identity that users are upserted on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserClaims {
    /// issuer url of the provider.
    #[serde(rename = "iss")]
    pub issuer: String,

    /// subject - the provider's stable identifier for the user.
    #[serde(rename = "sub")]
    pub subject: String,

    /// display name.
    #[serde(default, rename = "name")]
    pub name: String,

    /// email address, when the provider shares one.
    #[serde(default, rename = "email", skip_serializing_if = "String::is_empty")]
    pub email: String,

    /// profile picture url.
    #[serde(default, rename = "picture", skip_serializing_if = "String::is_empty")]
    pub picture: String,
}

/// an individual user on the system.
///
/// a user can be a member of 0 or more tailnets and owns the machines they
/// registered into each. created on first successful oidc login and never
/// deleted by the coordination core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// auto-generated unique id.
    pub id: i64,

    /// subject claim from the oidc token; unique.
    pub subject: String,

    /// name claim from the oidc token.
    pub name: String,

    /// full set of standard claims captured at login.
    pub claims: UserClaims,

    /// when the user first logged in.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claims_roundtrip() {
        let claims = UserClaims {
            issuer: "https://sso.example.com".to_string(),
            subject: "user123".to_string(),
            name: "Alice Smith".to_string(),
            email: "alice@example.com".to_string(),
            picture: String::new(),
        };

        let json = serde_json::to_string(&claims).unwrap();
        assert!(json.contains("\"sub\":\"user123\""));
        // empty picture is omitted
        assert!(!json.contains("picture"));

        let parsed: UserClaims = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.subject, "user123");
        assert_eq!(parsed.email, "alice@example.com");
    }

    #[test]
    fn claims_tolerate_missing_optionals() {
        let json = r#"{"iss":"https://sso.example.com","sub":"u1"}"#;
        let claims: UserClaims = serde_json::from_str(json).unwrap();
        assert_eq!(claims.subject, "u1");
        assert!(claims.name.is_empty());
        assert!(claims.email.is_empty());
    }
}
