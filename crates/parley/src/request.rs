//! Inbound packets as a closed set of requests.

use parley_protocol::{MessageType, Packet};

use crate::BrokerError;

/// Everything a client may ask the broker to do.
///
/// Publish-style variants keep the whole packet because it is forwarded to
/// recipients unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Login { username: String },
    Logout,
    Subscribe { topic: String },
    Unsubscribe { topic: String },
    /// Text to a user, a topic, the user-list query, or the game.
    Publish(Packet),
    /// Opens a file transfer; the payload is the filename.
    AnnounceFile(Packet),
    /// One chunk of an announced transfer.
    FileData(Packet),
}

impl TryFrom<Packet> for Request {
    type Error = BrokerError;

    /// ERROR and ACK are broker-to-client only and are refused here.
    fn try_from(packet: Packet) -> Result<Self, BrokerError> {
        Ok(match packet.kind {
            MessageType::Login => Self::Login {
                username: packet.sender,
            },
            MessageType::Logout => Self::Logout,
            MessageType::Subscribe => Self::Subscribe {
                topic: packet.topic,
            },
            MessageType::Unsubscribe => Self::Unsubscribe {
                topic: packet.topic,
            },
            MessageType::PublishText => Self::Publish(packet),
            MessageType::PublishFile => Self::AnnounceFile(packet),
            MessageType::FileData => Self::FileData(packet),
            kind @ (MessageType::Error | MessageType::Ack) => {
                return Err(BrokerError::InvalidMessageType(kind.into()));
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_takes_username_from_sender() {
        let packet = Packet::new(MessageType::Login).with_sender("alice");
        assert_eq!(
            Request::try_from(packet).unwrap(),
            Request::Login { username: "alice".into() }
        );
    }

    #[test]
    fn test_subscribe_takes_topic() {
        let packet = Packet::new(MessageType::Subscribe).with_topic("news");
        assert_eq!(
            Request::try_from(packet).unwrap(),
            Request::Subscribe { topic: "news".into() }
        );
    }

    #[test]
    fn test_publish_keeps_packet_intact() {
        let packet = Packet::text("news", "hi").with_sender("alice");
        assert_eq!(
            Request::try_from(packet.clone()).unwrap(),
            Request::Publish(packet)
        );
    }

    #[test]
    fn test_ack_and_error_are_invalid_requests() {
        assert!(matches!(
            Request::try_from(Packet::ack(1)),
            Err(BrokerError::InvalidMessageType(9))
        ));
        assert!(matches!(
            Request::try_from(Packet::error(1, "x")),
            Err(BrokerError::InvalidMessageType(8))
        ));
    }
}
