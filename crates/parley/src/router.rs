//! Pub/sub addressing and fan-out.
//!
//! The `topic` header field means two things: with the PRIVATE flag it is a
//! target username, without it a topic name. [`Route`] makes that explicit
//! so text publishes and file transfers address recipients the same way.

use parley_protocol::{Packet, topics};
use parley_session::SessionRegistry;
use parley_transport::ConnectionId;

use crate::{BrokerError, signal};

/// Where a publish is headed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// One user, by name.
    Private(String),
    /// Every subscriber of a topic except the publisher.
    Group(String),
}

impl Route {
    pub fn of(packet: &Packet) -> Self {
        if packet.is_private() {
            Self::Private(packet.topic.clone())
        } else {
            Self::Group(packet.topic.clone())
        }
    }

    pub fn target(&self) -> &str {
        match self {
            Self::Private(name) | Self::Group(name) => name,
        }
    }

    pub fn is_private(&self) -> bool {
        matches!(self, Self::Private(_))
    }
}

/// Checks that a file announce has somewhere to go.
///
/// A group target only needs one subscriber, who may be the announcer.
pub(crate) fn check_reachable(registry: &SessionRegistry, route: &Route) -> Result<(), BrokerError> {
    match route {
        Route::Private(user) if !registry.is_online(user) => {
            Err(BrokerError::UserUnavailable(user.clone()))
        }
        Route::Group(topic) if !registry.topic_has_subscribers(topic) => {
            Err(BrokerError::NoSubscribers(topic.clone()))
        }
        _ => Ok(()),
    }
}

/// Current recipients of `route`, never including `origin`.
///
/// An offline private target yields no recipients.
pub(crate) fn recipients(
    registry: &SessionRegistry,
    origin: ConnectionId,
    route: &Route,
) -> Vec<ConnectionId> {
    match route {
        Route::Private(user) => registry.find_by_username(user).into_iter().collect(),
        Route::Group(topic) => registry
            .sessions_subscribed_to(topic)
            .into_iter()
            .filter(|id| *id != origin)
            .collect(),
    }
}

/// Sends a copy of `packet` to each recipient.
pub(crate) fn fan_out(registry: &SessionRegistry, recipients: &[ConnectionId], packet: &Packet) {
    for id in recipients {
        registry.send(*id, packet.clone());
    }
}

/// Delivers an ordinary (non-reserved) text publish.
///
/// # Errors
/// - [`BrokerError::UserUnavailable`]: private target isn't logged in
/// - [`BrokerError::NotSubscribed`]: publisher hasn't joined the topic
/// - [`BrokerError::NoSubscribers`]: nobody else is on the topic
pub(crate) fn publish_text(
    registry: &SessionRegistry,
    origin: ConnectionId,
    packet: &Packet,
) -> Result<(), BrokerError> {
    let route = Route::of(packet);
    if let Route::Private(user) = &route {
        if !registry.is_online(user) {
            return Err(BrokerError::UserUnavailable(user.clone()));
        }
    }
    if let Route::Group(topic) = &route {
        if !registry.is_subscribed(origin, topic) {
            return Err(BrokerError::NotSubscribed(topic.clone()));
        }
    }

    let targets = recipients(registry, origin, &route);
    if targets.is_empty() {
        return Err(BrokerError::NoSubscribers(route.target().to_string()));
    }
    fan_out(registry, &targets, packet);
    tracing::debug!(
        %origin,
        target = route.target(),
        private = route.is_private(),
        recipients = targets.len(),
        "text delivered"
    );
    Ok(())
}

/// Replies to `/sys/get_users` with the sorted, newline-terminated list of
/// logged-in usernames. Only the requester gets it.
pub(crate) fn send_user_list(registry: &SessionRegistry, conn: ConnectionId) {
    let list: String = registry
        .online_users()
        .iter()
        .map(|user| format!("{user}\n"))
        .collect();
    signal::send_text(registry, conn, topics::USER_LIST, &list);
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_protocol::{Flags, MessageType};

    #[test]
    fn test_route_of_private_packet() {
        let packet = Packet::text("bob", "hi").with_flags(Flags::PRIVATE);
        let route = Route::of(&packet);
        assert_eq!(route, Route::Private("bob".into()));
        assert!(route.is_private());
        assert_eq!(route.target(), "bob");
    }

    #[test]
    fn test_route_of_group_packet() {
        let packet = Packet::new(MessageType::FileData)
            .with_topic("news")
            .with_flags(Flags::GROUP | Flags::FILE);
        assert_eq!(Route::of(&packet), Route::Group("news".into()));
    }
}
