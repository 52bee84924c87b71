//! Deep-link parsing and routing.
//!
//! Live Activity buttons open URLs like `prismae://log-meal?window=<uuid>`.
//! Parsing is a pure lookup ([`parse_deep_link`]) so the routing table can be
//! tested without threads; [`DeepLinkRouter`] applies the parsed action to the
//! published state and issues any activity side effects.
//!
//! | Host | Query | Effect |
//! |---|---|---|
//! | `log-meal` | `window` (optional) | open quick-add, mark reminder as logging |
//! | `dismiss-reminder` | `window` (required) | end the reminder as dismissed |
//! | `end-fast` | `id` (required) | ask the user to confirm ending the fast |

mod router;

pub use router::{DeepLinkRouter, RouterSnapshot, RouterState};

use url::Url;
use uuid::Uuid;

pub const LOG_MEAL_HOST: &str = "log-meal";
pub const DISMISS_REMINDER_HOST: &str = "dismiss-reminder";
pub const END_FAST_HOST: &str = "end-fast";

const WINDOW_PARAM: &str = "window";
const FAST_ID_PARAM: &str = "id";

/// A recognised deep-link action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeepLink {
    /// `window_id` is `None` when the link carried no usable window.
    LogMeal { window_id: Option<Uuid> },
    DismissReminder { window_id: Uuid },
    EndFast { fast_id: Uuid },
}

/// Why a URL was not routed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeepLinkError {
    #[error("not a valid URL")]
    Malformed,

    #[error("scheme `{0}` is not handled")]
    SchemeMismatch(String),

    #[error("unknown deep-link action `{0}`")]
    UnknownAction(String),

    #[error("`{action}` requires a valid `{param}` identifier")]
    MissingTarget {
        action: &'static str,
        param: &'static str,
    },
}

/// Parses `raw` against the app's registered `scheme`.
pub fn parse_deep_link(raw: &str, scheme: &str) -> Result<DeepLink, DeepLinkError> {
    let url = Url::parse(raw.trim()).map_err(|_| DeepLinkError::Malformed)?;

    if !url.scheme().eq_ignore_ascii_case(scheme) {
        return Err(DeepLinkError::SchemeMismatch(url.scheme().to_string()));
    }

    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    match host.as_str() {
        LOG_MEAL_HOST => Ok(DeepLink::LogMeal {
            window_id: uuid_param(&url, WINDOW_PARAM),
        }),
        DISMISS_REMINDER_HOST => uuid_param(&url, WINDOW_PARAM)
            .map(|window_id| DeepLink::DismissReminder { window_id })
            .ok_or(DeepLinkError::MissingTarget {
                action: DISMISS_REMINDER_HOST,
                param: WINDOW_PARAM,
            }),
        END_FAST_HOST => uuid_param(&url, FAST_ID_PARAM)
            .map(|fast_id| DeepLink::EndFast { fast_id })
            .ok_or(DeepLinkError::MissingTarget {
                action: END_FAST_HOST,
                param: FAST_ID_PARAM,
            }),
        _ => Err(DeepLinkError::UnknownAction(host)),
    }
}

/// First value of `name` parsed as a UUID.
fn uuid_param(url: &Url, name: &str) -> Option<Uuid> {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .and_then(|(_, value)| Uuid::parse_str(value.trim()).ok())
}

/// Builds the URL a Live Activity button should open.
pub fn build_deep_link(scheme: &str, link: &DeepLink) -> String {
    match link {
        DeepLink::LogMeal { window_id: Some(id) } => {
            format!("{}://{}?{}={}", scheme, LOG_MEAL_HOST, WINDOW_PARAM, id)
        }
        DeepLink::LogMeal { window_id: None } => format!("{}://{}", scheme, LOG_MEAL_HOST),
        DeepLink::DismissReminder { window_id } => {
            format!("{}://{}?{}={}", scheme, DISMISS_REMINDER_HOST, WINDOW_PARAM, window_id)
        }
        DeepLink::EndFast { fast_id } => {
            format!("{}://{}?{}={}", scheme, END_FAST_HOST, FAST_ID_PARAM, fast_id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "3f2b8c1e-9d4a-4b7e-8a21-5c6d7e8f9a0b";

    fn id() -> Uuid {
        Uuid::parse_str(ID).unwrap()
    }

    #[test]
    fn log_meal_with_window() {
        let link = parse_deep_link(&format!("prismae://log-meal?window={}", ID), "prismae");
        assert_eq!(link, Ok(DeepLink::LogMeal { window_id: Some(id()) }));
    }

    #[test]
    fn log_meal_degrades_without_window() {
        assert_eq!(
            parse_deep_link("prismae://log-meal", "prismae"),
            Ok(DeepLink::LogMeal { window_id: None })
        );
        assert_eq!(
            parse_deep_link("prismae://log-meal?window=not-a-uuid", "prismae"),
            Ok(DeepLink::LogMeal { window_id: None })
        );
    }

    #[test]
    fn dismiss_requires_window() {
        assert_eq!(
            parse_deep_link("prismae://dismiss-reminder", "prismae"),
            Err(DeepLinkError::MissingTarget {
                action: "dismiss-reminder",
                param: "window"
            })
        );
        assert_eq!(
            parse_deep_link(&format!("prismae://dismiss-reminder?window={}", ID), "prismae"),
            Ok(DeepLink::DismissReminder { window_id: id() })
        );
    }

    #[test]
    fn end_fast_reads_id_param() {
        assert_eq!(
            parse_deep_link(&format!("prismae://end-fast?id={}", ID), "prismae"),
            Ok(DeepLink::EndFast { fast_id: id() })
        );
        // `window` is not an alias for `id`
        assert!(parse_deep_link(&format!("prismae://end-fast?window={}", ID), "prismae").is_err());
    }

    #[test]
    fn other_schemes_are_rejected() {
        assert_eq!(
            parse_deep_link(&format!("https://log-meal?window={}", ID), "prismae"),
            Err(DeepLinkError::SchemeMismatch("https".to_string()))
        );
    }

    #[test]
    fn scheme_and_host_match_case_insensitively() {
        let link = parse_deep_link(&format!("PRISMAE://Log-Meal?window={}", ID), "prismae");
        assert_eq!(link, Ok(DeepLink::LogMeal { window_id: Some(id()) }));
    }

    #[test]
    fn unknown_host_is_rejected() {
        assert_eq!(
            parse_deep_link("prismae://start-fast", "prismae"),
            Err(DeepLinkError::UnknownAction("start-fast".to_string()))
        );
    }

    #[test]
    fn garbage_is_malformed() {
        assert_eq!(parse_deep_link("not a url", "prismae"), Err(DeepLinkError::Malformed));
    }

    #[test]
    fn built_links_parse_back() {
        for link in [
            DeepLink::LogMeal { window_id: Some(id()) },
            DeepLink::LogMeal { window_id: None },
            DeepLink::DismissReminder { window_id: id() },
            DeepLink::EndFast { fast_id: id() },
        ] {
            let url = build_deep_link("prismae", &link);
            assert_eq!(parse_deep_link(&url, "prismae"), Ok(link));
        }
    }
}
