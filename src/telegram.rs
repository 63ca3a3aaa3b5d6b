//! Telegram side of the bot: command parsing, update routing and the
//! [`ChatSurface`] implementation backed by teloxide.

use crate::acquire::{extension_of, fetch_url, parse_link, validate_extension, ScratchFile};
use crate::config::BotConfig;
use crate::delivery::{deliver_choice, ChatSurface, FormatChoice, MessageRef};
use crate::error::{AcquireError, DeliveryError, PipelineError};
use crate::ocr::{OcrInput, OcrProvider};
use crate::pipeline::{self, RequestKind};
use crate::session::SessionStore;
use std::sync::Arc;
use teloxide::{
    dispatching::UpdateHandler,
    net::Download,
    prelude::*,
    types::{Document, InlineKeyboardButton, InlineKeyboardMarkup, InputFile, MessageId, PhotoSize},
    utils::command::{BotCommands, ParseError},
};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;
pub type HandlerResult = Result<(), HandlerError>;

const WELCOME: &str = "👋 Welcome to the OCR Bot!\n\n\
    Send me a PDF or image, and I'll extract the text using Mistral OCR.\n\n\
    Commands:\n\
    /start - Show this help message\n\
    /help - Show help information\n\
    /link [URL] - Process a file from URL";

const HELP: &str = "📝 OCR Bot Help:\n\n\
    This bot uses Mistral's OCR technology to extract text from documents.\n\n\
    To use it, simply send:\n\
    - 📸 An image (.jpg, .png, etc.)\n\
    - 📄 A PDF document\n\
    - 🔗 Use /link [URL] to process a file from URL\n\n\
    The bot will process your file and return the extracted text.";

const UPLOAD_PROMPT: &str = "📤 Please upload your file or image!\n\n\
    I can process:\n\
    - 📸 Images (.jpg, .jpeg, .png)\n\
    - 📄 PDFs (.pdf)\n\n\
    Just send me the file, and I'll extract the text for you.";

const LINK_USAGE: &str = "Please provide a URL after the /link command.\n\
    Usage: /link http://example.com/file.pdf";

#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "These commands are supported:")]
pub enum Command {
    #[command(description = "show the welcome message.")]
    Start,
    #[command(description = "show help information.")]
    Help,
    #[command(description = "process a file from a URL.", parse_with = link_argument)]
    Link(String),
}

/// `/link` takes the rest of the line, which may be empty.
fn link_argument(input: String) -> Result<(String,), ParseError> {
    Ok((input.trim().to_string(),))
}

/// Validate a `/link` argument, or say what to reply instead.
pub fn link_target(arg: &str) -> Result<url::Url, String> {
    let arg = arg.split_whitespace().next().unwrap_or("");
    if arg.is_empty() {
        return Err(LINK_USAGE.to_string());
    }
    parse_link(arg).map_err(|e| format!("❌ {}", e))
}

/// Publicly fetchable URL for a Telegram file path, if one can be built.
/// The result contains the bot token.
pub fn direct_file_url(api_url: &str, token: &str, file_path: &str) -> Option<String> {
    if file_path.starts_with("http://") || file_path.starts_with("https://") {
        return Some(file_path.to_string());
    }
    if file_path.is_empty() || file_path.starts_with('/') {
        // Local Bot API server paths are not reachable from outside.
        return None;
    }
    Some(format!(
        "{}/file/bot{}/{}",
        api_url.trim_end_matches('/'),
        token,
        file_path
    ))
}

pub fn format_keyboard() -> InlineKeyboardMarkup {
    let button = |choice: FormatChoice| {
        InlineKeyboardButton::callback(choice.label(), choice.callback_data())
    };
    InlineKeyboardMarkup::new(vec![
        vec![button(FormatChoice::Text), button(FormatChoice::Markdown)],
        vec![button(FormatChoice::Cancel)],
    ])
}

/// A single Telegram chat.
pub struct TelegramSurface {
    bot: Bot,
    chat_id: ChatId,
}

impl TelegramSurface {
    pub fn new(bot: Bot, chat_id: ChatId) -> Self {
        Self { bot, chat_id }
    }
}

fn delivery_failed(e: teloxide::RequestError) -> DeliveryError {
    DeliveryError(e.to_string())
}

#[async_trait::async_trait]
impl ChatSurface for TelegramSurface {
    async fn send_text(&self, text: &str) -> Result<MessageRef, DeliveryError> {
        let sent = self
            .bot
            .send_message(self.chat_id, text)
            .await
            .map_err(delivery_failed)?;
        Ok(MessageRef(sent.id.0))
    }

    async fn edit_text(&self, message: MessageRef, text: &str) -> Result<(), DeliveryError> {
        self.bot
            .edit_message_text(self.chat_id, MessageId(message.0), text)
            .await
            .map_err(delivery_failed)?;
        Ok(())
    }

    async fn offer_formats(&self, prompt: &str) -> Result<MessageRef, DeliveryError> {
        let sent = self
            .bot
            .send_message(self.chat_id, prompt)
            .reply_markup(format_keyboard())
            .await
            .map_err(delivery_failed)?;
        Ok(MessageRef(sent.id.0))
    }

    async fn send_file(
        &self,
        file_name: &str,
        contents: Vec<u8>,
        caption: &str,
    ) -> Result<(), DeliveryError> {
        let document = InputFile::memory(contents).file_name(file_name.to_string());
        self.bot
            .send_document(self.chat_id, document)
            .caption(caption)
            .await
            .map_err(delivery_failed)?;
        Ok(())
    }
}

/// Pull a file out of Telegram storage through a scratch file.
async fn download_attachment(
    bot: &Bot,
    file_path: &str,
    extension: &str,
) -> Result<Vec<u8>, AcquireError> {
    let scratch = ScratchFile::create(extension)?;
    let mut dst = scratch.writer()?;
    bot.download_file(file_path, &mut dst)
        .await
        .map_err(|e| AcquireError::DownloadFailed(e.to_string()))?;
    dst.flush()
        .await
        .map_err(|e| AcquireError::DownloadFailed(e.to_string()))?;
    drop(dst);

    debug!("Downloaded {} into {}", file_path, scratch.path().display());
    scratch.into_bytes()
}

fn telegram_download_failed(e: teloxide::RequestError) -> AcquireError {
    AcquireError::DownloadFailed(e.to_string())
}

// ============================================================================
// Handlers
// ============================================================================

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    provider: Arc<dyn OcrProvider>,
    sessions: SessionStore,
    http: reqwest::Client,
) -> HandlerResult {
    match cmd {
        Command::Start => {
            bot.send_message(msg.chat.id, WELCOME).await?;
        }
        Command::Help => {
            bot.send_message(msg.chat.id, HELP).await?;
        }
        Command::Link(arg) => {
            let url = match link_target(&arg) {
                Ok(url) => url,
                Err(reply) => {
                    info!("Chat {}: rejected /link argument {:?}", msg.chat.id.0, arg);
                    bot.send_message(msg.chat.id, reply).await?;
                    return Ok(());
                }
            };

            let surface = TelegramSurface::new(bot, msg.chat.id);
            let session = sessions.session(msg.chat.id.0);
            let acquire = move || async move {
                let file = fetch_url(&http, &url).await?;
                debug!("Link resolved to {} ({})", file.file_name, file.extension);
                Ok::<_, PipelineError>(OcrInput::Upload {
                    file_name: file.file_name,
                    bytes: file.bytes,
                })
            };
            pipeline::run(RequestKind::Link, &surface, provider.as_ref(), &session, acquire).await;
        }
    }
    Ok(())
}

async fn handle_document(
    bot: Bot,
    msg: Message,
    document: Document,
    provider: Arc<dyn OcrProvider>,
    sessions: SessionStore,
) -> HandlerResult {
    info!("Chat {}: received document {:?}", msg.chat.id.0, document.file_name);

    let surface = TelegramSurface::new(bot.clone(), msg.chat.id);
    let session = sessions.session(msg.chat.id.0);
    pipeline::run(RequestKind::Document, &surface, provider.as_ref(), &session, move || async move {
        let file = bot
            .get_file(document.file.id.clone())
            .await
            .map_err(telegram_download_failed)?;

        let extension = extension_of(&file.path)
            .or_else(|| document.file_name.as_deref().and_then(extension_of))
            .unwrap_or_default();
        let extension = validate_extension(&extension)?;

        let file_name = document.file_name.clone().unwrap_or_else(|| {
            file.path
                .rsplit('/')
                .next()
                .unwrap_or("document")
                .to_string()
        });
        let bytes = download_attachment(&bot, &file.path, &extension).await?;

        Ok::<_, PipelineError>(OcrInput::Upload { file_name, bytes })
    })
    .await;
    Ok(())
}

async fn handle_photo(
    bot: Bot,
    msg: Message,
    photos: Vec<PhotoSize>,
    provider: Arc<dyn OcrProvider>,
    sessions: SessionStore,
    config: Arc<BotConfig>,
) -> HandlerResult {
    let Some(photo) = photos.last().cloned() else {
        return Ok(());
    };
    info!("Chat {}: received photo {}x{}", msg.chat.id.0, photo.width, photo.height);

    let surface = TelegramSurface::new(bot.clone(), msg.chat.id);
    let session = sessions.session(msg.chat.id.0);
    let message_id = msg.id.0;
    pipeline::run(RequestKind::Photo, &surface, provider.as_ref(), &session, move || async move {
        let file = bot
            .get_file(photo.file.id.clone())
            .await
            .map_err(telegram_download_failed)?;

        if config.photo_direct_url {
            if let Some(url) = direct_file_url(bot.api_url().as_str(), bot.token(), &file.path) {
                return Ok(OcrInput::ImageUrl(url));
            }
        }

        let bytes = download_attachment(&bot, &file.path, ".jpg").await?;
        Ok::<_, PipelineError>(OcrInput::Upload {
            file_name: format!("telegram_image_{}.jpg", message_id),
            bytes,
        })
    })
    .await;
    Ok(())
}

async fn prompt_upload(bot: Bot, msg: Message) -> HandlerResult {
    bot.send_message(msg.chat.id, UPLOAD_PROMPT).await?;
    Ok(())
}

async fn handle_callback(bot: Bot, q: CallbackQuery, sessions: SessionStore) -> HandlerResult {
    bot.answer_callback_query(q.id.clone()).await?;

    let Some(choice) = q.data.as_deref().and_then(FormatChoice::from_callback_data) else {
        warn!("Ignoring unknown callback data {:?}", q.data);
        return Ok(());
    };
    let Some(message) = q.message.as_ref() else {
        warn!("Callback {:?} has no message attached", choice);
        return Ok(());
    };

    let chat_id = message.chat().id;
    let surface = TelegramSurface::new(bot, chat_id);
    let session = sessions.session(chat_id.0);

    if let Err(e) = deliver_choice(&surface, &session, choice, MessageRef(message.id().0)).await {
        error!("Chat {}: {}", chat_id.0, e);
        if let Err(e) = surface.send_text(&format!("❌ {}", e)).await {
            error!("Chat {}: could not report delivery failure: {}", chat_id.0, e);
        }
    }
    Ok(())
}

/// Routing tree for every update the bot handles.
pub fn schema() -> UpdateHandler<HandlerError> {
    let messages = Update::filter_message()
        .branch(teloxide::filter_command::<Command, _>().endpoint(handle_command))
        .branch(Message::filter_photo().endpoint(handle_photo))
        .branch(Message::filter_document().endpoint(handle_document))
        .branch(Message::filter_text().endpoint(prompt_upload));

    let callbacks = Update::filter_callback_query().endpoint(handle_callback);

    dptree::entry().branch(messages).branch(callbacks)
}
