//! Answer decomposition: typed parts → ordered outbound sends.

use tracing::warn;

#[cfg(feature = "metrics")]
use herald_metrics::{bot as bot_metrics, counter};

use herald_channels::model::{HandoverContext, OutboundPayload};

/// The ordered send plan for one bot answer.
#[derive(Debug, Clone, Default)]
pub struct ReplyPlan {
    /// Payloads to dispatch strictly in this order.
    pub sends: Vec<OutboundPayload>,
    /// Present when a handover part short-circuited the decomposition; the
    /// remaining parts were discarded in favor of the human forward.
    pub handover: Option<HandoverContext>,
}

/// Convert the answer's typed parts into a [`ReplyPlan`].
///
/// Part order is preserved exactly. A part with an unrecognized type is
/// logged and skipped without failing the rest of the sequence; a
/// `handover` part stops the decomposition.
#[must_use]
pub fn decompose(parts: &[serde_json::Value]) -> ReplyPlan {
    let mut plan = ReplyPlan::default();

    for part in parts {
        let part_type = part["type"].as_str().unwrap_or("");
        match part_type {
            "text" => {
                if let Some(text) = part["text"].as_str() {
                    plan.sends.push(OutboundPayload::text(text));
                } else {
                    skip(part_type, part);
                }
            },
            "image" => {
                if let Some(url) = part["url"].as_str() {
                    plan.sends.push(OutboundPayload::Image {
                        url: url.to_string(),
                        caption: part["caption"].as_str().map(ToString::to_string),
                    });
                } else {
                    skip(part_type, part);
                }
            },
            "product" => {
                // Product cards render as their image with the title (and
                // price when present) as the caption.
                if let Some(url) = part["image_url"].as_str() {
                    let title = part["title"].as_str().unwrap_or("");
                    let caption = match part["price"].as_str() {
                        Some(price) => format!("{title} — {price}"),
                        None => title.to_string(),
                    };
                    plan.sends.push(OutboundPayload::Image {
                        url: url.to_string(),
                        caption: Some(caption),
                    });
                } else {
                    skip(part_type, part);
                }
            },
            "handover" => {
                plan.handover = Some(HandoverContext {
                    reason: part["reason"]
                        .as_str()
                        .unwrap_or("bot requested handover")
                        .to_string(),
                    suggested_action: part["suggested_action"].as_str().map(ToString::to_string),
                });
                break;
            },
            _ => skip(part_type, part),
        }
    }

    plan
}

fn skip(part_type: &str, part: &serde_json::Value) {
    warn!(part_type, %part, "unrecognized answer part, skipping");
    #[cfg(feature = "metrics")]
    counter!(bot_metrics::PARTS_SKIPPED_TOTAL).increment(1);
}
