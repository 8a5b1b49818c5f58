//! Classification of a channel's first request into one of the roles the
//! front-end recognizes: chat, a data-transfer substream, or neither.

/// A channel's determined role, derived from the payload of its first
/// subsystem or exec request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelRole {
    Chat,
    DataTransfer { transfer_id: String, stream_index: u32 },
}

/// Parse a subsystem name (already stripped of the `subsystem:` exec-command
/// prefix, if that's how it arrived) into a channel role.
pub fn classify(name: &str) -> Option<ChannelRole> {
    if name == "chat" {
        return Some(ChannelRole::Chat);
    }

    let rest = name.strip_prefix("data-transfer:")?;
    let (id, index) = rest.split_once(':')?;
    if id.len() != 32 || !id.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let stream_index: u32 = index.parse().ok()?;
    Some(ChannelRole::DataTransfer {
        transfer_id: id.to_string(),
        stream_index,
    })
}

/// The two encodings a subsystem request can arrive as: a native subsystem
/// request carrying `name` directly, or an exec request whose command is
/// the literal `subsystem:<name>`.
pub fn subsystem_name_from_exec_command(command: &str) -> Option<&str> {
    command.strip_prefix("subsystem:")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_classifies_as_chat() {
        assert_eq!(classify("chat"), Some(ChannelRole::Chat));
    }

    #[test]
    fn valid_data_transfer_name_classifies() {
        let id = "a".repeat(32);
        assert_eq!(
            classify(&format!("data-transfer:{id}:3")),
            Some(ChannelRole::DataTransfer {
                transfer_id: id,
                stream_index: 3
            })
        );
    }

    #[test]
    fn short_transfer_id_is_rejected() {
        assert_eq!(classify("data-transfer:deadbeef:0"), None);
    }

    #[test]
    fn non_hex_transfer_id_is_rejected() {
        let id = "z".repeat(32);
        assert_eq!(classify(&format!("data-transfer:{id}:0")), None);
    }

    #[test]
    fn negative_stream_index_is_rejected() {
        let id = "a".repeat(32);
        assert_eq!(classify(&format!("data-transfer:{id}:-1")), None);
    }

    #[test]
    fn unknown_subsystem_is_rejected() {
        assert_eq!(classify("sftp"), None);
    }

    #[test]
    fn exec_command_strips_subsystem_prefix() {
        assert_eq!(subsystem_name_from_exec_command("subsystem:chat"), Some("chat"));
        assert_eq!(subsystem_name_from_exec_command("ls -la"), None);
    }
}
