// Command parsing and routing.
//
// A chat line either starts with `/` (a command) or is plain text (a broadcast
// to everyone else online). `Command::parse` turns a line into a `Command`
// without touching shared state; `CommandProcessor::handle_line` then routes it
// into the message queue, consulting the registry for existence and presence.
//
// Lock discipline: the registry and the queue each have their own lock and are
// never held together. Every routing step reads what it needs from the
// registry first (a snapshot), releases it, and only then enqueues.
//
// Lines that cannot be routed (unknown command, unknown or missing target,
// `/msg` without text) produce nothing and no error reaches the sender. They
// all pass through `CommandProcessor::unroutable`, which is the one place to
// change if senders should ever be told.

use std::sync::Arc;

use chatterbox_protocol::{Username, is_quit_command};
use tracing::debug;

use crate::content::CannedContent;
use crate::queue::{Delivery, DeliveryKind, MessageQueue};
use crate::registry::{PresenceError, UserRegistry};

/// A parsed chat line. Borrowed from the line it was parsed from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command<'a> {
    /// Plain text for everyone else online.
    Broadcast(&'a str),
    Msg { target: &'a str, text: &'a str },
    Poke { target: &'a str },
    /// `/time` with an optional user; `None` means the sender.
    Time { target: Option<&'a str> },
    Joke,
    Picture,
    Users,
    Quit,
    /// Blank line.
    Empty,
    Unknown(&'a str),
}

impl<'a> Command<'a> {
    pub fn parse(line: &'a str) -> Self {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Command::Empty;
        }
        if is_quit_command(line) {
            return Command::Quit;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Command::Broadcast(line);
        };

        let (name, args) = rest.split_once(' ').unwrap_or((rest, ""));
        match name {
            "msg" => {
                let (target, text) = args.split_once(' ').unwrap_or((args, ""));
                Command::Msg { target, text }
            }
            "poke" => Command::Poke {
                target: first_word(args),
            },
            "time" => {
                let target = first_word(args);
                Command::Time {
                    target: (!target.is_empty()).then_some(target),
                }
            }
            "joke" => Command::Joke,
            "picture" => Command::Picture,
            "users" => Command::Users,
            "quit" | "close" => Command::Quit,
            _ => Command::Unknown(name),
        }
    }
}

fn first_word(args: &str) -> &str {
    args.split(' ').next().unwrap_or_default()
}

/// What the session should do after a line has been handled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Why a line produced no deliveries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Unroutable<'a> {
    UnknownCommand(&'a str),
    UnknownTarget(&'a str),
    MissingTarget,
    MissingText,
}

/// Routes parsed lines into the message queue.
#[derive(Clone)]
pub struct CommandProcessor {
    registry: Arc<UserRegistry>,
    queue: Arc<MessageQueue>,
    content: Arc<CannedContent>,
}

impl CommandProcessor {
    pub fn new(
        registry: Arc<UserRegistry>,
        queue: Arc<MessageQueue>,
        content: Arc<CannedContent>,
    ) -> Self {
        Self {
            registry,
            queue,
            content,
        }
    }

    pub fn registry(&self) -> &UserRegistry {
        &self.registry
    }

    pub fn queue(&self) -> &MessageQueue {
        &self.queue
    }

    /// Parse and route one line from `sender`.
    pub fn handle_line(&self, sender: &Username, line: &str) -> Flow {
        let command = Command::parse(line);
        debug!(user = %sender, ?command, "routing");

        match command {
            Command::Empty => {}
            Command::Quit => return Flow::Quit,
            Command::Broadcast(text) => {
                let fanned = self.fan_out(sender, |recipient| {
                    Delivery::from_user(recipient, sender.clone(), text, DeliveryKind::Broadcast)
                });
                debug!(user = %sender, recipients = fanned, "broadcast");
            }
            Command::Msg { target, text } => {
                if let Some(target) = self.existing_target(sender, target) {
                    if text.is_empty() {
                        self.unroutable(sender, Unroutable::MissingText);
                    } else {
                        self.deliver(Delivery::from_user(
                            target,
                            sender.clone(),
                            text,
                            DeliveryKind::DirectMessage,
                        ));
                    }
                }
            }
            Command::Poke { target } => {
                if let Some(target) = self.existing_target(sender, target) {
                    self.deliver(Delivery::from_user(
                        target,
                        sender.clone(),
                        "",
                        DeliveryKind::Poke,
                    ));
                }
            }
            Command::Time { target } => {
                let subject = target.unwrap_or(sender.as_str());
                let body = self.uptime_text(subject);
                self.reply(sender, body, DeliveryKind::UptimeReply);
            }
            Command::Joke => self.reply(sender, self.content.joke(), DeliveryKind::JokeReply),
            Command::Picture => {
                self.reply(sender, self.content.picture(), DeliveryKind::PictureReply);
            }
            Command::Users => {
                let body = self.listing_text(sender);
                self.reply(sender, body, DeliveryKind::ListingReply);
            }
            Command::Unknown(name) => self.unroutable(sender, Unroutable::UnknownCommand(name)),
        }
        Flow::Continue
    }

    /// Tell everyone else online that `user` arrived.
    pub fn announce_connected(&self, user: &Username) {
        self.announce(user, &format!("{user} has connected! :)"));
    }

    /// Tell everyone else online that `user` left.
    pub fn announce_disconnected(&self, user: &Username) {
        self.announce(user, &format!("{user} has disconnected! :("));
    }

    fn announce(&self, user: &Username, text: &str) {
        self.fan_out(user, |recipient| {
            Delivery::from_system(recipient, text, DeliveryKind::Broadcast)
        });
    }

    /// One delivery per connected user other than `sender`, resolved now.
    /// Returns the number of recipients.
    fn fan_out(&self, sender: &Username, make: impl Fn(Username) -> Delivery) -> usize {
        let recipients: Vec<Username> = self
            .registry
            .list_connected()
            .into_iter()
            .filter(|name| name != sender)
            .collect();
        let count = recipients.len();
        self.queue.enqueue_all(recipients.into_iter().map(make));
        count
    }

    fn reply(&self, sender: &Username, body: String, kind: DeliveryKind) {
        self.deliver(Delivery::from_system(sender.clone(), body, kind));
    }

    /// Queue one delivery. A full recipient is already logged by the queue;
    /// the sender is not told.
    fn deliver(&self, delivery: Delivery) {
        if let Err(full) = self.queue.enqueue(delivery) {
            debug!(recipient = %full.recipient, "delivery not queued");
        }
    }

    /// Resolve a `/msg` or `/poke` target, reporting why it failed if it did.
    fn existing_target(&self, sender: &Username, target: &str) -> Option<Username> {
        if target.is_empty() {
            self.unroutable(sender, Unroutable::MissingTarget);
            return None;
        }
        if !self.registry.exists(target) {
            self.unroutable(sender, Unroutable::UnknownTarget(target));
            return None;
        }
        Some(Username::from(target))
    }

    /// The single decision point for lines that go nowhere. Dropped silently
    /// toward the sender; logged for operators.
    fn unroutable(&self, sender: &Username, why: Unroutable<'_>) {
        debug!(user = %sender, ?why, "dropped unroutable line");
    }

    fn uptime_text(&self, subject: &str) -> String {
        match self.registry.connected_duration(subject) {
            Ok(uptime) => format!(
                "{subject} has been connected for {} seconds.\n",
                uptime.as_secs()
            ),
            Err(PresenceError::NotConnected) => format!("{subject} is not connected.\n"),
            Err(PresenceError::NotFound) => format!("Could not find: {subject}\n"),
        }
    }

    fn listing_text(&self, viewer: &Username) -> String {
        let mut text = String::from("Connected Users:\n");
        for (i, name) in self.registry.list_connected().iter().enumerate() {
            let shown = if name == viewer { "You" } else { name.as_str() };
            text.push_str(&format!("{}. {shown}\n", i + 1));
        }
        text
    }
}
