//! Owner-credential authorization.

use crate::error::{ActionError, ActionResult};
use crate::input::AuthBundle;
use crate::resource::AuthSpec;
use crate::service::fields::is_present;
use crate::value::{value_eq, value_in};
use serde_json::{Map, Value};

/// A resolved field value and the claim it must match.
#[derive(Clone, Debug, PartialEq)]
pub struct OwnerCred {
    pub local_value: Value,
    pub claim: String,
}

/// Split `"field"` or `"field => claim"`.
fn parse_rule(rule: &str) -> (&str, &str) {
    match rule.split_once("=>") {
        Some((local, claim)) => (local.trim(), claim.trim()),
        None => (rule.trim(), rule.trim()),
    }
}

/// One pair per rule whose local field is present in `fields`.
pub fn parse_owner_creds(auth: Option<&AuthSpec>, fields: &Map<String, Value>) -> Vec<OwnerCred> {
    let Some(auth) = auth else {
        return Vec::new();
    };
    auth.owner_creds
        .iter()
        .map(|rule| parse_rule(rule))
        .filter(|(local, _)| is_present(fields, local))
        .filter_map(|(local, claim)| {
            Some(OwnerCred {
                local_value: fields.get(local)?.clone(),
                claim: claim.to_string(),
            })
        })
        .collect()
}

/// True when any pair matches: membership for list claims, equality otherwise.
pub fn is_allowed(bundle: &AuthBundle, creds: &[OwnerCred]) -> bool {
    creds.iter().any(|cred| match bundle.get(&cred.claim) {
        Some(Value::Array(values)) => value_in(&cred.local_value, values),
        Some(Value::Null) | None => false,
        Some(claim) => value_eq(&cred.local_value, claim),
    })
}

/// Skip when no bundle is supplied; otherwise deny unless a rule matches.
pub fn authorize(
    bundle: Option<&AuthBundle>,
    auth: Option<&AuthSpec>,
    fields: &Map<String, Value>,
) -> ActionResult<()> {
    let Some(bundle) = bundle else {
        return Ok(());
    };
    if is_allowed(bundle, &parse_owner_creds(auth, fields)) {
        Ok(())
    } else {
        Err(ActionError::NotAuthorized)
    }
}
