//! Conversion from domain entities to HTTP DTOs.
//!
//! Timestamps are rendered as RFC 3339 (UTC).

use huddle_shared::time::timestamp_to_rfc3339;

use crate::domain::{
    Conversation, MessageView, Participant, ParticipantRole, RoomSnapshot, Timestamp,
};

use super::http::{
    ConversationDto, LastMessageDto, MessageDto, ParticipantDto, ReadReceiptDto, RoomStateDto,
    SenderDto, TypingUserDto,
};

fn rfc3339(timestamp: Timestamp) -> Option<String> {
    timestamp_to_rfc3339(timestamp.value())
}

impl From<Conversation> for ConversationDto {
    fn from(model: Conversation) -> Self {
        Self {
            id: model.id.into_string(),
            kind: model.kind,
            name: model.name,
            creator_id: model.creator_id.map(|id| id.into_string()),
            participant_ids: model
                .participant_ids
                .into_iter()
                .map(|id| id.into_string())
                .collect(),
            last_message: model.last_message.map(|last| LastMessageDto {
                message_id: last.message_id.into_string(),
                timestamp: rfc3339(last.timestamp),
            }),
            created_at: rfc3339(model.created_at),
            updated_at: rfc3339(model.updated_at),
        }
    }
}

impl From<Participant> for ParticipantDto {
    fn from(model: Participant) -> Self {
        let role = match model.role {
            ParticipantRole::Admin => "admin",
            ParticipantRole::Member => "member",
        };
        Self {
            user_id: model.user_id.into_string(),
            role: role.to_string(),
            joined_at: rfc3339(model.joined_at),
            last_read_at: model.last_read_at.and_then(rfc3339),
        }
    }
}

impl From<MessageView> for MessageDto {
    fn from(view: MessageView) -> Self {
        Self {
            id: view.id.into_string(),
            content: view.content,
            conversation_id: view.conversation_id.into_string(),
            sender: SenderDto {
                id: view.sender.id.into_string(),
                name: view.sender.name,
            },
            created_at: rfc3339(view.created_at),
            read_by: view
                .read_by
                .into_iter()
                .map(|receipt| ReadReceiptDto {
                    user_id: receipt.user_id.into_string(),
                    read_at: rfc3339(receipt.read_at),
                })
                .collect(),
        }
    }
}

impl From<RoomSnapshot> for RoomStateDto {
    fn from(snapshot: RoomSnapshot) -> Self {
        Self {
            conversation_id: snapshot.conversation_id.into_string(),
            online_users: snapshot
                .online_users
                .into_iter()
                .map(|id| id.into_string())
                .collect(),
            typing_users: snapshot
                .typing_users
                .into_iter()
                .map(|entry| TypingUserDto {
                    user_id: entry.user_id.into_string(),
                    started_at: rfc3339(entry.started_at),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        ConversationId, ConversationKind, LastMessage, MessageId, ReadReceipt, UserId, UserSummary,
    };

    #[test]
    fn test_conversation_to_dto() {
        // テスト項目: 会話エンティティが RFC 3339 の日時を持つ DTO に変換される
        // given (前提条件):
        let mut conversation = Conversation::new(
            ConversationId::new("c1".to_string()).unwrap(),
            ConversationKind::Group,
            Some("general".to_string()),
            Some(UserId::new("alice".to_string()).unwrap()),
            Timestamp::new(0),
        );
        conversation.record_last_message(LastMessage {
            message_id: MessageId::new("m1".to_string()).unwrap(),
            timestamp: Timestamp::new(1_000),
        });

        // when (操作):
        let dto: ConversationDto = conversation.into();

        // then (期待する結果):
        assert_eq!(dto.id, "c1");
        assert_eq!(dto.creator_id.as_deref(), Some("alice"));
        assert_eq!(dto.created_at.as_deref(), Some("1970-01-01T00:00:00.000Z"));
        assert_eq!(
            dto.last_message.unwrap().timestamp.as_deref(),
            Some("1970-01-01T00:00:01.000Z")
        );
    }

    #[test]
    fn test_participant_to_dto() {
        // テスト項目: 参加者の役割が小文字の文字列になる
        // given (前提条件):
        let participant = Participant::new(
            UserId::new("bob".to_string()).unwrap(),
            ConversationId::new("c1".to_string()).unwrap(),
            ParticipantRole::Admin,
            Timestamp::new(0),
        );

        // when (操作):
        let dto: ParticipantDto = participant.into();

        // then (期待する結果):
        assert_eq!(dto.role, "admin");
        assert!(dto.last_read_at.is_none());
    }

    #[test]
    fn test_message_view_to_dto() {
        // テスト項目: 送信者と既読情報を持つメッセージが RFC 3339 の日時で DTO になる
        // given (前提条件):
        let view = MessageView {
            id: MessageId::new("m1".to_string()).unwrap(),
            content: "hello".to_string(),
            conversation_id: ConversationId::new("c1".to_string()).unwrap(),
            sender: UserSummary {
                id: UserId::new("alice".to_string()).unwrap(),
                name: "Alice".to_string(),
            },
            created_at: Timestamp::new(2_000),
            read_by: vec![ReadReceipt {
                user_id: UserId::new("bob".to_string()).unwrap(),
                read_at: Timestamp::new(3_000),
            }],
        };

        // when (操作):
        let dto: MessageDto = view.into();

        // then (期待する結果):
        assert_eq!(dto.sender.name, "Alice");
        assert_eq!(dto.created_at.as_deref(), Some("1970-01-01T00:00:02.000Z"));
        assert_eq!(dto.read_by[0].user_id, "bob");
        assert_eq!(
            dto.read_by[0].read_at.as_deref(),
            Some("1970-01-01T00:00:03.000Z")
        );
    }
}
