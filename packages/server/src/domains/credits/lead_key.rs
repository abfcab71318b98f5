//! Canonical lead identity.
//!
//! A lead key names the *company* behind a contact, so that two people at
//! the same company are one billable lead. Branches, in priority order:
//!
//! 1. `domain:<domain>` from the domain field or the website URL host
//! 2. `place:<place id>` verbatim
//! 3. `company:<name>[_<city>][_<country>]`
//! 4. `email:<email domain or "unknown">`

use serde::{Deserialize, Serialize};
use url::Url;

use crate::common::ContactId;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadCompany {
    pub domain: Option<String>,
    pub website_url: Option<String>,
    pub name: String,
    pub city: Option<String>,
    pub country: Option<String>,
    pub place_id: Option<String>,
}

/// One delivered contact, in the shape the ledger keys on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadContact {
    pub contact_id: Option<ContactId>,
    pub email: String,
    pub company: LeadCompany,
}

pub fn generate_lead_key(contact: &LeadContact) -> String {
    let company = &contact.company;

    if let Some(domain) = company_domain(company) {
        return format!("domain:{}", domain);
    }

    if let Some(place_id) = non_empty(company.place_id.as_deref()) {
        return format!("place:{}", place_id);
    }

    let parts: Vec<String> = [
        Some(company.name.as_str()),
        company.city.as_deref(),
        company.country.as_deref(),
    ]
    .into_iter()
    .flatten()
    .map(normalize)
    .filter(|part| !part.is_empty())
    .collect();
    // City or country alone does not identify a company
    if !normalize(&company.name).is_empty() {
        return format!("company:{}", parts.join("_"));
    }

    let email_domain = contact
        .email
        .rsplit_once('@')
        .map(|(_, domain)| normalize(strip_www(&domain.trim().to_lowercase())))
        .filter(|domain| !domain.is_empty())
        .unwrap_or_else(|| "unknown".to_string());
    format!("email:{}", email_domain)
}

/// Lower-case; each run of non-alphanumeric characters becomes one `_`;
/// leading and trailing `_` are dropped.
pub fn normalize(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut pending_separator = false;

    for ch in value.chars().flat_map(char::to_lowercase) {
        if ch.is_alphanumeric() {
            if pending_separator && !out.is_empty() {
                out.push('_');
            }
            pending_separator = false;
            out.push(ch);
        } else {
            pending_separator = true;
        }
    }

    out
}

fn company_domain(company: &LeadCompany) -> Option<String> {
    let raw = non_empty(company.domain.as_deref())
        .map(|domain| host_of(domain).unwrap_or_else(|| domain.to_string()))
        .or_else(|| non_empty(company.website_url.as_deref()).and_then(host_of))?;

    let domain = normalize(strip_www(&raw.to_lowercase()));
    (!domain.is_empty()).then_some(domain)
}

/// Host of a URL, tolerating a missing scheme ("acme.com/about").
fn host_of(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let parsed = Url::parse(raw)
        .ok()
        .filter(|url| url.has_host())
        .or_else(|| Url::parse(&format!("https://{}", raw)).ok())?;
    parsed.host_str().map(str::to_string)
}

fn strip_www(domain: &str) -> &str {
    domain.strip_prefix("www.").unwrap_or(domain)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
