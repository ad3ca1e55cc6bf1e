//! One-time bootstrap tokens delivered on the identity-provider redirect.
//!
//! The backend callback redirects to the frontend with the token pair in the
//! fragment (`#access_token=..&refresh_token=..`) or the query string. Hash
//! routes such as `#/dashboard?token=..` are handled too. Once read, the
//! parameters are stripped so the tokens never linger in the address.

use url::form_urlencoded;
use url::Url;

const ACCESS_KEYS: [&str; 2] = ["access_token", "token"];
const REFRESH_KEYS: [&str; 2] = ["refresh_token", "refreshToken"];
const ERROR_KEY: &str = "error";

/// What a redirect URL carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bootstrap {
    Tokens {
        access_token: String,
        refresh_token: String,
    },
    /// The provider flow failed; the message is shown to the user
    Failed(String),
    /// No bootstrap parameters at all
    Absent,
}

#[derive(Debug, Clone)]
pub struct Redirect {
    pub bootstrap: Bootstrap,
    /// The URL with every bootstrap parameter removed
    pub sanitized_url: String,
}

fn is_bootstrap_key(key: &str) -> bool {
    ACCESS_KEYS.contains(&key) || REFRESH_KEYS.contains(&key) || key == ERROR_KEY
}

fn parse_pairs(params: &str) -> Vec<(String, String)> {
    form_urlencoded::parse(params.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

fn serialize_kept(pairs: &[(String, String)]) -> Option<String> {
    let kept: Vec<&(String, String)> = pairs.iter().filter(|(k, _)| !is_bootstrap_key(k)).collect();
    if kept.is_empty() {
        return None;
    }
    Some(
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(kept.into_iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .finish(),
    )
}

/// Split a fragment into a hash route and its parameters.
fn split_fragment(fragment: &str) -> (Option<&str>, &str) {
    match fragment.split_once('?') {
        Some((route, params)) => (Some(route), params),
        None if fragment.contains('=') => (None, fragment),
        None => (Some(fragment), ""),
    }
}

fn first_value(pairs: &[(String, String)], keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        pairs
            .iter()
            .find(|(k, v)| k == key && !v.is_empty())
            .map(|(_, v)| v.clone())
    })
}

/// Read bootstrap parameters from `url` and return it sanitized.
pub fn parse_redirect(url: &str) -> Result<Redirect, url::ParseError> {
    let mut url = Url::parse(url)?;

    let query_pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let fragment = url.fragment().unwrap_or_default().to_string();
    let (route, fragment_params) = split_fragment(&fragment);
    let fragment_pairs = parse_pairs(fragment_params);

    // Fragment wins over query when both carry the same key
    let all: Vec<(String, String)> = fragment_pairs
        .iter()
        .chain(query_pairs.iter())
        .cloned()
        .collect();

    let bootstrap = if let Some(error) = first_value(&all, &[ERROR_KEY]) {
        Bootstrap::Failed(error)
    } else {
        match (first_value(&all, &ACCESS_KEYS), first_value(&all, &REFRESH_KEYS)) {
            (Some(access_token), Some(refresh_token)) => Bootstrap::Tokens {
                access_token,
                refresh_token,
            },
            (None, None) => Bootstrap::Absent,
            _ => Bootstrap::Failed("Tokens de autenticación incompletos".to_string()),
        }
    };

    if query_pairs.iter().any(|(k, _)| is_bootstrap_key(k)) {
        url.set_query(serialize_kept(&query_pairs).as_deref());
    }

    if fragment_pairs.iter().any(|(k, _)| is_bootstrap_key(k)) {
        let kept = serialize_kept(&fragment_pairs);
        let new_fragment = match (route.filter(|r| !r.is_empty()), kept) {
            (Some(route), Some(params)) => Some(format!("{}?{}", route, params)),
            (Some(route), None) => Some(route.to_string()),
            (None, Some(params)) => Some(params),
            (None, None) => None,
        };
        url.set_fragment(new_fragment.as_deref());
    }

    Ok(Redirect {
        bootstrap,
        sanitized_url: url.to_string(),
    })
}
