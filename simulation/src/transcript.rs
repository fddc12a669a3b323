//! Per-bot transcript files and their merged forms.
//!
//! Each bot of an externally run simulation writes its own transcript with
//! the bot's name and timestamped entries. `unify` interleaves the two by
//! timestamp, and `simplify` reduces the result to the spoken messages of
//! "Bot 1" and "Bot 2", which is what gets imported as conversation turns.

use common::storage::types::conversation_turn::{ConversationTurn, Speaker};
use serde::{Deserialize, Serialize};

pub const BOT1_LABEL: &str = "Bot 1";
pub const BOT2_LABEL: &str = "Bot 2";

/// Entry types that carry conversation content.
const MESSAGE_TYPES: [&str; 3] = ["transcription", "response", "message"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    /// `%Y-%m-%d %H:%M:%S`, so lexical order is chronological.
    pub timestamp: String,
    pub speaker: String,
    pub text: String,
    #[serde(rename = "type")]
    pub entry_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotTranscript {
    pub bot_name: String,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub entries: Vec<TranscriptEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnifiedEntry {
    pub timestamp: String,
    pub bot: String,
    pub speaker: String,
    pub message: String,
    #[serde(rename = "type")]
    pub entry_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnifiedTranscript {
    pub bot1_name: String,
    pub bot2_name: String,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub total_turns: usize,
    pub conversation: Vec<UnifiedEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimplifiedMessage {
    pub bot: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimplifiedTranscript {
    pub bot1_name: String,
    pub bot2_name: String,
    pub messages: Vec<SimplifiedMessage>,
}

fn tag_entries(transcript: &BotTranscript) -> impl Iterator<Item = UnifiedEntry> + '_ {
    transcript.entries.iter().map(|entry| UnifiedEntry {
        timestamp: entry.timestamp.clone(),
        bot: transcript.bot_name.clone(),
        speaker: entry.speaker.clone(),
        message: entry.text.clone(),
        entry_type: entry.entry_type.clone(),
    })
}

/// Merges both transcripts ordered by timestamp; on equal timestamps the
/// first bot's entries come first.
pub fn unify(bot1: &BotTranscript, bot2: &BotTranscript) -> UnifiedTranscript {
    let mut conversation: Vec<UnifiedEntry> = tag_entries(bot1).chain(tag_entries(bot2)).collect();
    conversation.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

    let start_time = [&bot1.start_time, &bot2.start_time]
        .into_iter()
        .flatten()
        .min()
        .cloned();
    let end_time = [&bot1.end_time, &bot2.end_time]
        .into_iter()
        .flatten()
        .max()
        .cloned();

    UnifiedTranscript {
        bot1_name: bot1.bot_name.clone(),
        bot2_name: bot2.bot_name.clone(),
        start_time,
        end_time,
        total_turns: conversation.len(),
        conversation,
    }
}

pub fn simplify(unified: &UnifiedTranscript) -> SimplifiedTranscript {
    let messages = unified
        .conversation
        .iter()
        .filter(|entry| MESSAGE_TYPES.contains(&entry.entry_type.as_str()))
        .filter_map(|entry| {
            let label = if entry.bot == unified.bot1_name {
                BOT1_LABEL
            } else if entry.bot == unified.bot2_name {
                BOT2_LABEL
            } else {
                return None;
            };
            Some(SimplifiedMessage {
                bot: label.to_string(),
                message: entry.message.clone(),
            })
        })
        .collect();

    SimplifiedTranscript {
        bot1_name: unified.bot1_name.clone(),
        bot2_name: unified.bot2_name.clone(),
        messages,
    }
}

/// Converts a simplified transcript into ordered turns. Bot 1 is the agent
/// under test and Bot 2 the simulated user; blank messages are dropped.
pub fn to_turns(simplified: &SimplifiedTranscript, conversation_id: &str) -> Vec<ConversationTurn> {
    simplified
        .messages
        .iter()
        .filter(|message| !message.message.trim().is_empty())
        .zip(0u32..)
        .map(|(message, turn_index)| {
            let (speaker, speaker_name) = if message.bot == BOT1_LABEL {
                (Speaker::Agent, &simplified.bot1_name)
            } else {
                (Speaker::Simulator, &simplified.bot2_name)
            };
            ConversationTurn::new(
                conversation_id.to_string(),
                turn_index,
                speaker,
                speaker_name.clone(),
                message.message.trim().to_string(),
                0,
            )
        })
        .collect()
}
