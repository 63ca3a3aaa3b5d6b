//! Result Delivery: preview in chat, then offer the result as a file.

use crate::error::DeliveryError;
use crate::normalize::NormalizedResult;
use crate::session::Session;
use tracing::{info, warn};

/// Transcripts longer than this are not previewed at all.
pub const PREVIEW_LIMIT: usize = 4096;
/// Most characters shown when a transcript is previewed.
pub const PREVIEW_CHARS: usize = 4000;
/// Telegram's cap on message text, counted in UTF-16 code units.
pub const TELEGRAM_TEXT_LIMIT: usize = 4096;

pub const TEXT_FILE_NAME: &str = "extracted_text.txt";
pub const MARKDOWN_FILE_NAME: &str = "extracted_content.md";

const FILE_CAPTION: &str = "🎉 Here's your extracted file!";
const CHOICE_PROMPT: &str = "📝 Choose a download format:";
const CANCELLED: &str = "❌ Operation cancelled";
const NOTHING_STORED: &str =
    "⚠️ There is no extracted content to download. Please send a file or image first.";

/// Identifier of a message the bot has sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRef(pub i32);

/// What the user picked on the inline keyboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatChoice {
    Text,
    Markdown,
    Cancel,
}

impl FormatChoice {
    pub const ALL: [FormatChoice; 3] = [
        FormatChoice::Text,
        FormatChoice::Markdown,
        FormatChoice::Cancel,
    ];

    pub fn callback_data(self) -> &'static str {
        match self {
            FormatChoice::Text => "format_txt",
            FormatChoice::Markdown => "format_md",
            FormatChoice::Cancel => "format_cancel",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FormatChoice::Text => "Text (.txt)",
            FormatChoice::Markdown => "Markdown (.md)",
            FormatChoice::Cancel => "❌ Cancel",
        }
    }

    pub fn from_callback_data(data: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.callback_data() == data)
    }
}

/// The chat a request is talking to.
#[async_trait::async_trait]
pub trait ChatSurface: Send + Sync {
    async fn send_text(&self, text: &str) -> Result<MessageRef, DeliveryError>;
    async fn edit_text(&self, message: MessageRef, text: &str) -> Result<(), DeliveryError>;
    /// Send `prompt` with one inline button per [`FormatChoice`].
    async fn offer_formats(&self, prompt: &str) -> Result<MessageRef, DeliveryError>;
    async fn send_file(
        &self,
        file_name: &str,
        contents: Vec<u8>,
        caption: &str,
    ) -> Result<(), DeliveryError>;
}

const PREVIEW_HEADER: &str = "✅ Text extracted successfully! Here's the content:\n\n";
const PREVIEW_HINT: &str = "\n\n(Select 'Download as file' below for complete content)";
const PREVIEW_TOO_LONG: &str =
    "✅ Text extracted successfully! The content is too long to display here.\n\
    Please use the buttons below to get the content as a file.";

/// Text that replaces the status message once OCR is done.
///
/// The result always fits in one Telegram message: the shown head stops at
/// [`PREVIEW_CHARS`] characters or wherever the UTF-16 budget runs out.
pub fn preview_text(transcript: &str) -> String {
    let len = transcript.chars().count();
    if len > PREVIEW_LIMIT {
        return PREVIEW_TOO_LONG.to_string();
    }

    let budget = TELEGRAM_TEXT_LIMIT
        - PREVIEW_HEADER.encode_utf16().count()
        - PREVIEW_HINT.encode_utf16().count();
    let mut head = String::new();
    let mut used = 0;
    for c in transcript.chars().take(PREVIEW_CHARS) {
        if used + c.len_utf16() > budget {
            break;
        }
        used += c.len_utf16();
        head.push(c);
    }

    let hint = if head.len() < transcript.len() {
        PREVIEW_HINT
    } else {
        ""
    };
    format!("{}{}{}", PREVIEW_HEADER, head, hint)
}

/// Show the preview, offer the formats and keep the result for the choice.
pub async fn present(
    surface: &dyn ChatSurface,
    session: &Session,
    status: MessageRef,
    result: NormalizedResult,
) -> Result<(), DeliveryError> {
    surface.edit_text(status, &preview_text(&result.plain_text)).await?;
    session.remember(result);
    surface.offer_formats(CHOICE_PROMPT).await?;
    Ok(())
}

/// React to a button press on the format keyboard.
pub async fn deliver_choice(
    surface: &dyn ChatSurface,
    session: &Session,
    choice: FormatChoice,
    selection: MessageRef,
) -> Result<(), DeliveryError> {
    if choice == FormatChoice::Cancel {
        info!("Chat {}: download cancelled", session.chat_id());
        return surface.edit_text(selection, CANCELLED).await;
    }

    let Some(result) = session.latest() else {
        warn!("Chat {}: format chosen but nothing stored", session.chat_id());
        surface.send_text(NOTHING_STORED).await?;
        return Ok(());
    };

    let (file_name, contents) = match choice {
        FormatChoice::Markdown => (MARKDOWN_FILE_NAME, result.markdown),
        _ => (TEXT_FILE_NAME, result.plain_text),
    };

    info!("Chat {}: sending {} ({} bytes)", session.chat_id(), file_name, contents.len());
    surface.send_file(file_name, contents.into_bytes(), FILE_CAPTION).await
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Everything a surface was asked to do, in order.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Sent {
        Text(i32, String),
        Edit(i32, String),
        Formats(i32, String),
        File(String, Vec<u8>, String),
    }

    #[derive(Default)]
    pub struct RecordingSurface {
        pub log: Mutex<Vec<Sent>>,
        next_id: Mutex<i32>,
    }

    impl RecordingSurface {
        pub fn sent(&self) -> Vec<Sent> {
            self.log.lock().unwrap().clone()
        }

        pub fn files(&self) -> Vec<(String, Vec<u8>)> {
            self.sent()
                .into_iter()
                .filter_map(|s| match s {
                    Sent::File(name, bytes, _) => Some((name, bytes)),
                    _ => None,
                })
                .collect()
        }

        fn next(&self) -> i32 {
            let mut id = self.next_id.lock().unwrap();
            *id += 1;
            *id
        }
    }

    #[async_trait::async_trait]
    impl ChatSurface for RecordingSurface {
        async fn send_text(&self, text: &str) -> Result<MessageRef, DeliveryError> {
            let id = self.next();
            self.log.lock().unwrap().push(Sent::Text(id, text.to_string()));
            Ok(MessageRef(id))
        }

        async fn edit_text(&self, message: MessageRef, text: &str) -> Result<(), DeliveryError> {
            self.log.lock().unwrap().push(Sent::Edit(message.0, text.to_string()));
            Ok(())
        }

        async fn offer_formats(&self, prompt: &str) -> Result<MessageRef, DeliveryError> {
            let id = self.next();
            self.log.lock().unwrap().push(Sent::Formats(id, prompt.to_string()));
            Ok(MessageRef(id))
        }

        async fn send_file(
            &self,
            file_name: &str,
            contents: Vec<u8>,
            caption: &str,
        ) -> Result<(), DeliveryError> {
            self.log
                .lock()
                .unwrap()
                .push(Sent::File(file_name.to_string(), contents, caption.to_string()));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{RecordingSurface, Sent};
    use super::*;
    use crate::session::SessionStore;

    fn result() -> NormalizedResult {
        NormalizedResult {
            plain_text: "Hello\n\n".to_string(),
            markdown: "# Hello".to_string(),
        }
    }

    #[test]
    fn test_callback_data_round_trip() {
        for choice in FormatChoice::ALL {
            assert_eq!(FormatChoice::from_callback_data(choice.callback_data()), Some(choice));
        }
        assert_eq!(FormatChoice::from_callback_data("format_pdf"), None);
    }

    #[test]
    fn test_preview_boundaries() {
        let exact = "a".repeat(PREVIEW_LIMIT);
        let preview = preview_text(&exact);
        assert!(preview.starts_with(PREVIEW_HEADER));
        assert!(preview.ends_with(PREVIEW_HINT));

        let over = "a".repeat(PREVIEW_LIMIT + 1);
        assert_eq!(preview_text(&over), PREVIEW_TOO_LONG);
    }

    #[test]
    fn test_preview_fits_one_message() {
        for n in [1, 3900, 4000, 4001, 4096] {
            let preview = preview_text(&"a".repeat(n));
            assert!(
                preview.encode_utf16().count() <= TELEGRAM_TEXT_LIMIT,
                "{n} chars -> {} units",
                preview.encode_utf16().count()
            );
        }

        // Each emoji is two UTF-16 units, so the head is cut well before 4000 chars.
        let emoji = "😀".repeat(3000);
        let preview = preview_text(&emoji);
        assert!(preview.encode_utf16().count() <= TELEGRAM_TEXT_LIMIT);
        assert!(preview.contains("😀"));
        assert!(preview.ends_with(PREVIEW_HINT));
    }

    #[test]
    fn test_preview_shows_up_to_head_length() {
        let preview = preview_text(&"a".repeat(3900));
        assert!(preview.ends_with(&"a".repeat(3900)));
        assert!(!preview.contains("Download as file"));

        let preview = preview_text(&"a".repeat(4001));
        assert!(preview.contains(&"a".repeat(3900)));
        assert!(!preview.contains(&"a".repeat(PREVIEW_CHARS + 1)));
        assert!(preview.ends_with(PREVIEW_HINT));
    }

    #[test]
    fn test_short_preview_shown_in_full() {
        let preview = preview_text("short text");
        assert!(preview.ends_with("short text"));
        assert!(!preview.contains("Download as file"));
    }

    #[test]
    fn test_preview_counts_characters_not_bytes() {
        let cyrillic = "ж".repeat(PREVIEW_LIMIT);
        assert!(cyrillic.len() > PREVIEW_LIMIT);
        assert!(preview_text(&cyrillic).contains("Here's the content"));
    }

    #[tokio::test]
    async fn test_present_then_download_text() {
        let surface = RecordingSurface::default();
        let session = SessionStore::new().session(7);

        present(&surface, &session, MessageRef(100), result()).await.unwrap();
        deliver_choice(&surface, &session, FormatChoice::Text, MessageRef(1))
            .await
            .unwrap();
        // The result is kept, so a second format can still be fetched.
        deliver_choice(&surface, &session, FormatChoice::Markdown, MessageRef(1))
            .await
            .unwrap();

        let sent = surface.sent();
        assert!(matches!(&sent[0], Sent::Edit(100, text) if text.contains("Hello")));
        assert!(matches!(&sent[1], Sent::Formats(_, prompt) if prompt == CHOICE_PROMPT));
        assert_eq!(
            surface.files(),
            vec![
                (TEXT_FILE_NAME.to_string(), b"Hello\n\n".to_vec()),
                (MARKDOWN_FILE_NAME.to_string(), b"# Hello".to_vec()),
            ]
        );
    }

    #[tokio::test]
    async fn test_cancel_sends_no_file() {
        let surface = RecordingSurface::default();
        let session = SessionStore::new().session(7);

        present(&surface, &session, MessageRef(100), result()).await.unwrap();
        let selection = match surface.sent()[1] {
            Sent::Formats(id, _) => MessageRef(id),
            ref other => panic!("expected format keyboard, got {:?}", other),
        };
        deliver_choice(&surface, &session, FormatChoice::Cancel, selection)
            .await
            .unwrap();

        let sent = surface.sent();
        assert_eq!(sent.last(), Some(&Sent::Edit(selection.0, CANCELLED.to_string())));
        assert!(surface.files().is_empty());
    }

    #[tokio::test]
    async fn test_choice_without_stored_result() {
        let surface = RecordingSurface::default();
        let session = SessionStore::new().session(7);

        deliver_choice(&surface, &session, FormatChoice::Markdown, MessageRef(1))
            .await
            .unwrap();

        assert_eq!(surface.sent(), vec![Sent::Text(1, NOTHING_STORED.to_string())]);
    }
}
