use crate::types::{Message, Role};

/// 把对话历史渲染为单条prompt
///
/// 只有一条用户消息时直接返回其内容；否则按角色输出完整记录，
/// 并以最后一条用户消息作为当前问题。
pub fn render_conversation(messages: &[Message]) -> String {
    match messages {
        [] => String::new(),
        [only] if only.role == Role::User => only.content.clone(),
        _ => {
            let mut prompt = String::from("# Conversation so far\n");
            let last_user = messages.iter().rposition(|m| m.role == Role::User);
            for (index, message) in messages.iter().enumerate() {
                if Some(index) == last_user {
                    continue;
                }
                prompt.push_str(&format!("[{}]: {}\n", message.role, message.content));
            }
            if let Some(index) = last_user {
                prompt.push_str("\n# Current question\n");
                prompt.push_str(&messages[index].content);
            }
            prompt
        }
    }
}
