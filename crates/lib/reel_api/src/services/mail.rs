//! Emailed link construction and best-effort delivery.

use reel_core::mail::{MailKind, MailMessage, Mailer};
use tracing::warn;
use url::Url;

use crate::error::{AppError, AppResult};

/// Build `<base>/<page>?token=<secret>`, keeping any path already on `base`.
pub fn single_use_link(base: &str, page: &str, secret: &str) -> AppResult<String> {
    let mut url =
        Url::parse(base).map_err(|e| AppError::Internal(format!("invalid APP_BASE_URL: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| AppError::Internal("APP_BASE_URL cannot be a base".into()))?
        .pop_if_empty()
        .extend(page.split('/'));
    url.set_fragment(None);
    url.query_pairs_mut().clear().append_pair("token", secret);
    Ok(url.into())
}

/// Hand a message to the mailer. Failures are logged and swallowed.
pub async fn deliver(mailer: &dyn Mailer, kind: MailKind, to: &str, display_name: &str, link: String) {
    let message = MailMessage {
        kind,
        to: to.to_string(),
        display_name: display_name.to_string(),
        link,
    };
    if let Err(e) = mailer.send(message).await {
        warn!(kind = kind.as_str(), to = %to, error = %e, "mail delivery failed");
    }
}
