use url::Url;

use crate::identity::Identity;
use crate::transport::TransportError;

const CAPTCHA_PARAM: &str = "captcha";
const NICK_PARAM: &str = "nick";

/// Turns a user-supplied server address into a `ws://` or `wss://` URL.
///
/// Bare hosts get `wss://` unless they point at the local machine. `http(s)`
/// schemes map to their websocket counterparts and `localhost` becomes
/// `127.0.0.1` to sidestep IPv6 resolution surprises.
pub fn normalize_server(raw: &str) -> Result<Url, TransportError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(invalid(raw, "empty address"));
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else if is_local(trimmed) {
        format!("ws://{trimmed}")
    } else {
        format!("wss://{trimmed}")
    };

    let mut url = Url::parse(&with_scheme).map_err(|err| invalid(raw, &err.to_string()))?;
    let scheme = match url.scheme() {
        "ws" | "http" => "ws",
        "wss" | "https" => "wss",
        other => return Err(invalid(raw, &format!("unsupported scheme {other}"))),
    };
    if url.scheme() != scheme {
        url.set_scheme(scheme)
            .map_err(|_| invalid(raw, "cannot switch to websocket scheme"))?;
    }
    if url.host_str() == Some("localhost") {
        url.set_host(Some("127.0.0.1"))
            .map_err(|err| invalid(raw, &err.to_string()))?;
    }
    Ok(url)
}

/// Server URL carrying the identity as `captcha` and `nick` query parameters.
/// Unrelated query parameters on the server URL survive.
pub fn endpoint_url(server: &Url, identity: &Identity) -> Url {
    let mut url = server.clone();
    let retained: Vec<(String, String)> = server
        .query_pairs()
        .filter(|(key, _)| key != CAPTCHA_PARAM && key != NICK_PARAM)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    url.set_query(None);
    {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in &retained {
            pairs.append_pair(key, value);
        }
        pairs
            .append_pair(CAPTCHA_PARAM, &identity.captcha)
            .append_pair(NICK_PARAM, &identity.nick);
    }
    url
}

fn is_local(address: &str) -> bool {
    address.starts_with("localhost") || address.starts_with("127.0.0.1")
}

fn invalid(raw: &str, reason: &str) -> TransportError {
    TransportError::InvalidEndpoint {
        url: raw.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_hosts_pick_scheme_by_locality() {
        assert_eq!(
            normalize_server("place.example.com/ws").unwrap().as_str(),
            "wss://place.example.com/ws"
        );
        assert_eq!(
            normalize_server("localhost:8080").unwrap().as_str(),
            "ws://127.0.0.1:8080/"
        );
    }

    #[test]
    fn http_schemes_map_to_websocket() {
        assert_eq!(
            normalize_server("https://place.example.com").unwrap().scheme(),
            "wss"
        );
        assert_eq!(normalize_server("http://10.0.0.2:9000").unwrap().scheme(), "ws");
    }

    #[test]
    fn rejects_unusable_addresses() {
        assert!(normalize_server("   ").is_err());
        assert!(normalize_server("ftp://place.example.com").is_err());
    }

    #[test]
    fn endpoint_encodes_identity() {
        let server = normalize_server("wss://place.example.com/ws?room=main&nick=old").unwrap();
        let identity = Identity::new("Pixel Fan&co", "tok/1");
        let url = endpoint_url(&server, &identity);
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("room".to_string(), "main".to_string()),
                ("captcha".to_string(), "tok/1".to_string()),
                ("nick".to_string(), "Pixel Fan&co".to_string()),
            ]
        );
    }
}
