// Display formatting for drained deliveries.
//
// The session sends each delivery to its client as one frame of ready-to-print
// text. Replies produced by the server already carry their own layout and
// trailing newline, so only user-originated kinds get decorated here.

use crate::queue::{Delivery, DeliveryKind, Origin};

const PM_RULE: &str = "************************************";

/// Format one delivery for its recipient's terminal.
pub fn render(delivery: &Delivery) -> String {
    let sender = match &delivery.sender {
        Origin::User(name) => name.as_str(),
        Origin::System => "SERVER",
    };

    match delivery.kind {
        DeliveryKind::DirectMessage => {
            format!("\n{PM_RULE}\npm from {sender}: {}\n{PM_RULE}\n", delivery.body)
        }
        DeliveryKind::Broadcast => match delivery.sender {
            Origin::User(_) => format!("{sender} has said: {}\n", delivery.body),
            Origin::System => format!("{}\n", delivery.body),
        },
        DeliveryKind::Poke => format!("\n{sender} has poked you!\n"),
        DeliveryKind::UptimeReply
        | DeliveryKind::JokeReply
        | DeliveryKind::PictureReply
        | DeliveryKind::ListingReply => delivery.body.clone(),
    }
}
