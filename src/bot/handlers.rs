//! Update handlers: command dispatch, the inline menu, and free-text chat.
//!
//! Handlers never propagate failures; anything that goes wrong is logged and
//! the dispatcher keeps running.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, InputFile, ParseMode};
use tracing::{info, warn};

use crate::bot::commands::{
    Command, convert_units, countdown_seconds, dice_sides, flip_coin, generate_password,
    password_length, render_qr_png, roll_die,
};
use crate::bot::gemini::GeminiClient;
use crate::bot::responder::Responder;
use crate::bot::storage::{BanStore, HistoryStore};
use crate::config::Config;

pub const BAN_NOTICE: &str = "🚫 You are banned from using this bot.";
pub const MAINTENANCE_NOTICE: &str =
    "🛠 Bot is under maintenance right now. Thodi der baad try karo!";
const OWNER_ONLY: &str = "❌ This command is only for my owner!";

/// Shared state for all handlers.
pub struct BotState {
    pub config: Config,
    pub gemini: GeminiClient,
    pub responder: Responder,
    pub history: HistoryStore,
    pub bans: BanStore,
    pub maintenance: AtomicBool,
}

impl BotState {
    pub fn new(config: Config, gemini: GeminiClient) -> Self {
        let responder = Responder::new(
            config.hinglish_prompt.clone(),
            config.bot_name.clone(),
            config.language.clone(),
        );
        Self {
            config,
            gemini,
            responder,
            history: HistoryStore::new("conversation_history.json"),
            bans: BanStore::new("banned_users.json"),
            maintenance: AtomicBool::new(false),
        }
    }

    fn maintenance_on(&self) -> bool {
        self.maintenance.load(Ordering::Relaxed)
    }
}

/// What to do with an incoming free-text message.
#[derive(Debug, PartialEq)]
pub enum Gate {
    Banned,
    Maintenance,
    Open,
}

/// Ban wins over maintenance; owners bypass maintenance.
pub fn gate_message(is_banned: bool, maintenance: bool, is_owner: bool) -> Gate {
    if is_banned {
        Gate::Banned
    } else if maintenance && !is_owner {
        Gate::Maintenance
    } else {
        Gate::Open
    }
}

/// Free-text messages: gate, then run the conversation round-trip.
pub async fn handle_text(bot: Bot, msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    let Some(text) = msg.text() else {
        return Ok(());
    };
    // Unrecognized /commands fall through the command branch; don't feed
    // them to the model.
    if text.starts_with('/') {
        return Ok(());
    }

    let chat_id = msg.chat.id;
    let gate = gate_message(
        state.bans.is_banned(user.id.0 as i64),
        state.maintenance_on(),
        state.config.is_owner(user.id),
    );
    match gate {
        Gate::Banned => {
            info!("Dropping message from banned user {}", user.id);
            send_text(&bot, chat_id, BAN_NOTICE).await;
            return Ok(());
        }
        Gate::Maintenance => {
            send_text(&bot, chat_id, MAINTENANCE_NOTICE).await;
            return Ok(());
        }
        Gate::Open => {}
    }

    let history = state.history.read(chat_id.0);
    let reply = state.responder.generate(&state.gemini, &history, text).await;

    state.history.append(chat_id.0, "user", text);
    state.history.append(chat_id.0, "model", &reply);

    send_text(&bot, chat_id, &reply).await;
    Ok(())
}

pub async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    state: Arc<BotState>,
) -> ResponseResult<()> {
    let chat_id = msg.chat.id;
    let user_id = msg.from.as_ref().map(|u| u.id);

    if let Some(user_id) = user_id
        && state.bans.is_banned(user_id.0 as i64)
    {
        send_text(&bot, chat_id, BAN_NOTICE).await;
        return Ok(());
    }

    let is_owner = user_id.is_some_and(|id| state.config.is_owner(id));

    match cmd {
        Command::Start => {
            let welcome = format!(
                "✨ Hi, I'm {}! Your fun and friendly companion who loves chatting in {}. \
                 Whether you want to laugh, share your thoughts, or just kill some time, \
                 I'm always here to keep the conversation light and joyful. \
                 Think of me as a dost who never lets you feel alone. 🌸💬",
                state.config.bot_name, state.config.language
            );
            let sent = bot
                .send_message(chat_id, welcome)
                .reply_markup(main_menu_keyboard())
                .await;
            if let Err(e) = sent {
                warn!("Failed to send welcome: {e}");
            }
        }
        Command::Help => {
            use teloxide::utils::command::BotCommands;
            send_text(&bot, chat_id, &Command::descriptions().to_string()).await;
        }
        Command::Status => {
            let status = format!(
                "🤖 {} status\n\n\
                 ✰ language: {}\n\
                 ✰ current model: {}\n\
                 ✰ maintenance: {}\n\n\
                 Just type anything to chat with me! I remember our last 10 messages.",
                state.config.bot_name,
                state.config.language,
                state.gemini.current_model(),
                if state.maintenance_on() { "on" } else { "off" },
            );
            send_text(&bot, chat_id, &status).await;
        }
        Command::ClearMemory => {
            let cleared = state.history.clear(chat_id.0);
            let reply = if cleared {
                "🧹 Chat history cleared! Fresh start, bolo kya baat karni hai?"
            } else {
                "Nothing to clear, we haven't talked yet!"
            };
            send_text(&bot, chat_id, reply).await;
        }
        Command::Dice(arg) => {
            let sides = dice_sides(&arg);
            let roll = roll_die(sides);
            send_text(&bot, chat_id, &format!("🎲 You rolled a {roll} (d{sides})")).await;
        }
        Command::Flip => {
            send_text(&bot, chat_id, &format!("🪙 It's {}!", flip_coin())).await;
        }
        Command::Password(arg) => {
            let password = generate_password(password_length(&arg));
            let reply = format!("🔑 Generated password:\n`{password}`");
            if let Err(e) = bot
                .send_message(chat_id, reply)
                .parse_mode(ParseMode::Markdown)
                .await
            {
                warn!("Failed to send password: {e}");
            }
        }
        Command::Qr(arg) => {
            if arg.trim().is_empty() {
                send_text(&bot, chat_id, "Usage: /qr <text>").await;
                return Ok(());
            }
            match render_qr_png(arg.trim()) {
                Ok(png) => {
                    let photo = InputFile::memory(png).file_name("qr.png");
                    if let Err(e) = bot
                        .send_photo(chat_id, photo)
                        .caption(format!("QR code for: {}", arg.trim()))
                        .await
                    {
                        warn!("Failed to send QR: {e}");
                    }
                }
                Err(e) => send_text(&bot, chat_id, &e).await,
            }
        }
        Command::Countdown(arg) => {
            let Some(seconds) = countdown_seconds(&arg) else {
                send_text(&bot, chat_id, "Usage: /countdown <1-60 seconds>").await;
                return Ok(());
            };
            run_countdown(&bot, chat_id, seconds).await;
        }
        Command::Convert(arg) => {
            let reply = match convert_units(&arg) {
                Ok(converted) => converted,
                Err(usage) => usage,
            };
            send_text(&bot, chat_id, &reply).await;
        }

        Command::Broadcast(message) => {
            if !is_owner {
                send_text(&bot, chat_id, OWNER_ONLY).await;
                return Ok(());
            }
            if message.trim().is_empty() {
                send_text(&bot, chat_id, "Usage: /broadcast <message>").await;
                return Ok(());
            }
            let mut count = 0;
            for target in state.history.chat_ids() {
                match bot.send_message(ChatId(target), message.clone()).await {
                    Ok(_) => count += 1,
                    Err(e) => warn!("Failed to broadcast to {target}: {e}"),
                }
            }
            send_text(&bot, chat_id, &format!("📢 Broadcast sent to {count} chats!")).await;
        }
        Command::Stats => {
            if !is_owner {
                send_text(&bot, chat_id, OWNER_ONLY).await;
                return Ok(());
            }
            send_text(&bot, chat_id, &build_stats(&state)).await;
        }
        Command::Ban(arg) => {
            if !is_owner {
                send_text(&bot, chat_id, OWNER_ONLY).await;
                return Ok(());
            }
            let reply = match arg.trim().parse::<i64>() {
                Ok(target) => {
                    if state.bans.ban(target) {
                        format!("✅ User {target} has been banned.")
                    } else {
                        format!("User {target} is already banned.")
                    }
                }
                Err(_) => "Invalid user id. Please provide a numeric id.".to_string(),
            };
            send_text(&bot, chat_id, &reply).await;
        }
        Command::Unban(arg) => {
            if !is_owner {
                send_text(&bot, chat_id, OWNER_ONLY).await;
                return Ok(());
            }
            let reply = match arg.trim().parse::<i64>() {
                Ok(target) => {
                    if state.bans.unban(target) {
                        format!("✅ User {target} has been unbanned.")
                    } else {
                        format!("User {target} is not banned.")
                    }
                }
                Err(_) => "Invalid user id. Please provide a numeric id.".to_string(),
            };
            send_text(&bot, chat_id, &reply).await;
        }
        Command::Maintenance(arg) => {
            if !is_owner {
                send_text(&bot, chat_id, OWNER_ONLY).await;
                return Ok(());
            }
            let reply = match arg.trim().to_lowercase().as_str() {
                "" => format!(
                    "Maintenance mode is currently {}",
                    if state.maintenance_on() { "on" } else { "off" }
                ),
                "on" | "true" | "enable" => {
                    state.maintenance.store(true, Ordering::Relaxed);
                    "🛠 Maintenance mode is now on".to_string()
                }
                "off" | "false" | "disable" => {
                    state.maintenance.store(false, Ordering::Relaxed);
                    "✅ Maintenance mode is now off".to_string()
                }
                _ => "Usage: /maintenance <on/off>".to_string(),
            };
            send_text(&bot, chat_id, &reply).await;
        }
        Command::GetUser(arg) => {
            if !is_owner {
                send_text(&bot, chat_id, OWNER_ONLY).await;
                return Ok(());
            }
            let reply = match arg.trim().parse::<i64>() {
                Ok(target) => format!(
                    "👤 User info\n\n\
                     ✰ id: {target}\n\
                     ✰ banned: {}\n\
                     ✰ stored turns: {}",
                    state.bans.is_banned(target),
                    state.history.read(target).len(),
                ),
                Err(_) => "Usage: /getuser <user_id>".to_string(),
            };
            send_text(&bot, chat_id, &reply).await;
        }
        Command::Backup => {
            if !is_owner {
                send_text(&bot, chat_id, OWNER_ONLY).await;
                return Ok(());
            }
            let path = state.history.path();
            if !path.exists() {
                send_text(&bot, chat_id, "No conversation history to back up yet.").await;
                return Ok(());
            }
            let document = InputFile::file(path.to_path_buf())
                .file_name("conversation_history_backup.json");
            match bot.send_document(chat_id, document).await {
                Ok(_) => send_text(&bot, chat_id, "✅ Backup complete!").await,
                Err(e) => send_text(&bot, chat_id, &format!("Backup failed: {e}")).await,
            }
        }
        Command::Ping => {
            if !is_owner {
                send_text(&bot, chat_id, OWNER_ONLY).await;
                return Ok(());
            }
            let started = std::time::Instant::now();
            match bot.send_message(chat_id, "🏓 Pong!").await {
                Ok(sent) => {
                    let latency = started.elapsed().as_millis();
                    bot.edit_message_text(
                        chat_id,
                        sent.id,
                        format!("🏓 Pong! Latency: {latency}ms"),
                    )
                    .await
                    .ok();
                }
                Err(e) => warn!("Failed to ping: {e}"),
            }
        }
    }

    Ok(())
}

/// Inline menu button presses.
pub async fn handle_callback(bot: Bot, q: CallbackQuery, state: Arc<BotState>) -> ResponseResult<()> {
    bot.answer_callback_query(q.id.clone()).await.ok();

    let Some(message) = q.message else {
        return Ok(());
    };
    let data = q.data.as_deref().unwrap_or("");
    let response = menu_response(data, &state.config);

    if let Err(e) = bot
        .edit_message_text(message.chat().id, message.id(), response)
        .reply_markup(main_menu_keyboard())
        .await
    {
        warn!("Failed to edit menu message: {e}");
    }
    Ok(())
}

fn main_menu_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![
            InlineKeyboardButton::callback("✰ help ✰", "help"),
            InlineKeyboardButton::callback("✰ add me ✰", "add_to_group"),
        ],
        vec![
            InlineKeyboardButton::callback("✰ commands ✰", "commands"),
            InlineKeyboardButton::callback("✰ owner ✰", "owner"),
        ],
        vec![InlineKeyboardButton::callback("✰ change language ✰", "change_language")],
    ])
}

/// Canned text for each menu button.
pub fn menu_response(data: &str, config: &Config) -> String {
    match data {
        "help" => format!(
            "🆘 {} help 🆘\n\n\
             ✰ /start - show welcome message\n\
             ✰ /clearmemory - clear chat history\n\
             ✰ /status - show bot status\n\n\
             Just type anything to chat with me!\n\
             I remember our last 10 messages.",
            config.bot_name
        ),
        "add_to_group" => format!(
            "📢 Add {} to your group!\n\n\
             Open {}?startgroup=true to add me.\n\n\
             I'll bring fun conversations to your group members!",
            config.bot_name, config.bot_username
        ),
        "commands" => "🔧 Available commands 🔧\n\n\
             ✰ /start - show welcome message\n\
             ✰ /clearmemory - clear chat history\n\
             ✰ /status - show bot status\n\
             ✰ /help - show the full command list\n\n\
             Just chat naturally for conversations!"
            .to_string(),
        "owner" => format!(
            "👑 Bot owner 👑\n\n\
             Bot created and maintained by: {}\n\n\
             For any issues or suggestions, contact {} \
             or join the support group: {}",
            config.owner_name, config.owner_name, config.support_group
        ),
        "change_language" => format!(
            "🌐 Language settings 🌐\n\n\
             Current language: {}\n\n\
             Available languages:\n\
             ✰ Hinglish (default)\n\
             ✰ English\n\
             ✰ Hindi\n\n\
             To change language, contact my owner!",
            config.language
        ),
        _ => "Invalid option selected.".to_string(),
    }
}

fn build_stats(state: &BotState) -> String {
    let pool = state.gemini.stats();
    let mut stats = format!(
        "📊 Bot statistics 📊\n\n\
         ✰ active chats: {}\n\
         ✰ banned users: {}\n\
         ✰ api keys: {}\n\
         ✰ current model: {}\n\n\
         🔢 Key usage:\n",
        state.history.chat_count(),
        state.bans.count(),
        pool.key_count,
        pool.current_model,
    );
    for (i, used) in pool.usage.iter().enumerate() {
        stats.push_str(&format!("  ▸ key {}: {} requests\n", i + 1, used));
    }
    stats
}

async fn run_countdown(bot: &Bot, chat_id: ChatId, seconds: u64) {
    let sent = match bot
        .send_message(chat_id, format!("⏳ Countdown: {seconds}"))
        .await
    {
        Ok(sent) => sent,
        Err(e) => {
            warn!("Failed to start countdown: {e}");
            return;
        }
    };

    for remaining in (0..seconds).rev() {
        tokio::time::sleep(Duration::from_secs(1)).await;
        let text = if remaining == 0 {
            "🎉 Time's up!".to_string()
        } else {
            format!("⏳ Countdown: {remaining}")
        };
        if bot.edit_message_text(chat_id, sent.id, text).await.is_err() {
            break;
        }
    }
}

async fn send_text(bot: &Bot, chat_id: ChatId, text: &str) {
    if let Err(e) = bot.send_message(chat_id, text).await {
        warn!("Failed to send message to {chat_id}: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_banned_wins() {
        assert_eq!(gate_message(true, false, false), Gate::Banned);
        assert_eq!(gate_message(true, true, true), Gate::Banned);
    }

    #[test]
    fn test_gate_maintenance_blocks_non_owner() {
        assert_eq!(gate_message(false, true, false), Gate::Maintenance);
        assert_eq!(gate_message(false, true, true), Gate::Open);
    }

    #[test]
    fn test_gate_open() {
        assert_eq!(gate_message(false, false, false), Gate::Open);
    }
}
