//! Command definitions and the pure helpers behind the novelty commands.

use image::Luma;
use qrcode::QrCode;
use rand::Rng;
use teloxide::utils::command::BotCommands;

#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "These commands are supported:")]
pub enum Command {
    #[command(description = "show welcome message.")]
    Start,
    #[command(description = "show this help message.")]
    Help,
    #[command(description = "show bot status.")]
    Status,
    #[command(description = "clear chat history.")]
    ClearMemory,
    #[command(description = "roll a die: /dice [sides]")]
    Dice(String),
    #[command(description = "flip a coin.")]
    Flip,
    #[command(description = "generate a password: /password [length]")]
    Password(String),
    #[command(description = "make a QR code: /qr <text>")]
    Qr(String),
    #[command(description = "count down: /countdown <seconds>")]
    Countdown(String),
    #[command(description = "convert units: /convert <value> <km|mi|kg|lb|c|f>")]
    Convert(String),

    // Owner-only below.
    #[command(description = "broadcast a message to all chats.")]
    Broadcast(String),
    #[command(description = "show bot statistics.")]
    Stats,
    #[command(description = "ban a user: /ban <user_id>")]
    Ban(String),
    #[command(description = "unban a user: /unban <user_id>")]
    Unban(String),
    #[command(description = "toggle maintenance mode: /maintenance [on|off]")]
    Maintenance(String),
    #[command(description = "look up a user: /getuser <user_id>")]
    GetUser(String),
    #[command(description = "send a backup of the conversation history.")]
    Backup,
    #[command(description = "measure round-trip latency.")]
    Ping,
}

const PASSWORD_CHARS: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789!@#$%^&*()";

/// Die size from the raw argument: default 6, clamped to 2..=100.
/// Anything non-numeric falls back to the default.
pub fn dice_sides(arg: &str) -> u32 {
    match arg.trim().parse::<u32>() {
        Ok(sides) => sides.clamp(2, 100),
        Err(_) => 6,
    }
}

pub fn roll_die(sides: u32) -> u32 {
    rand::thread_rng().gen_range(1..=sides)
}

pub fn flip_coin() -> &'static str {
    if rand::thread_rng().gen_bool(0.5) { "heads" } else { "tails" }
}

/// Password length from the raw argument: default 12, clamped to 6..=32.
pub fn password_length(arg: &str) -> usize {
    match arg.trim().parse::<usize>() {
        Ok(len) => len.clamp(6, 32),
        Err(_) => 12,
    }
}

pub fn generate_password(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| PASSWORD_CHARS[rng.gen_range(0..PASSWORD_CHARS.len())] as char)
        .collect()
}

/// Render a QR code as PNG bytes, ready to send as a photo.
pub fn render_qr_png(text: &str) -> Result<Vec<u8>, String> {
    let code = QrCode::new(text.as_bytes()).map_err(|e| format!("Failed to build QR: {e}"))?;
    let rendered = code
        .render::<Luma<u8>>()
        .min_dimensions(256, 256)
        .build();

    let mut png = Vec::new();
    rendered
        .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
        .map_err(|e| format!("Failed to encode QR: {e}"))?;
    Ok(png)
}

/// Countdown duration, restricted to 1..=60 seconds.
pub fn countdown_seconds(arg: &str) -> Option<u64> {
    arg.trim()
        .parse::<u64>()
        .ok()
        .filter(|secs| (1..=60).contains(secs))
}

/// `/convert <value> <unit>` over a fixed set of unit pairs.
pub fn convert_units(input: &str) -> Result<String, String> {
    const USAGE: &str = "Usage: /convert <value> <km|mi|kg|lb|c|f>";

    let mut parts = input.split_whitespace();
    let value: f64 = parts
        .next()
        .and_then(|raw| raw.parse().ok())
        .ok_or_else(|| USAGE.to_string())?;
    let unit = parts.next().ok_or_else(|| USAGE.to_string())?;

    let (converted, from, to) = match unit.to_lowercase().as_str() {
        "km" => (value * 0.621371, "km", "mi"),
        "mi" => (value * 1.609344, "mi", "km"),
        "kg" => (value * 2.204623, "kg", "lb"),
        "lb" => (value * 0.453592, "lb", "kg"),
        "c" => (value * 9.0 / 5.0 + 32.0, "°C", "°F"),
        "f" => ((value - 32.0) * 5.0 / 9.0, "°F", "°C"),
        _ => return Err(USAGE.to_string()),
    };

    Ok(format!("{value:.2} {from} = {converted:.2} {to}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dice_sides_default_and_clamp() {
        assert_eq!(dice_sides(""), 6);
        assert_eq!(dice_sides("not a number"), 6);
        assert_eq!(dice_sides("20"), 20);
        assert_eq!(dice_sides("1"), 2);
        assert_eq!(dice_sides("5000"), 100);
    }

    #[test]
    fn test_roll_die_in_range() {
        for _ in 0..100 {
            let roll = roll_die(6);
            assert!((1..=6).contains(&roll));
        }
    }

    #[test]
    fn test_flip_coin_values() {
        assert!(matches!(flip_coin(), "heads" | "tails"));
    }

    #[test]
    fn test_password_length_default_and_clamp() {
        assert_eq!(password_length(""), 12);
        assert_eq!(password_length("16"), 16);
        assert_eq!(password_length("3"), 6);
        assert_eq!(password_length("99"), 32);
    }

    #[test]
    fn test_generate_password_uses_charset() {
        let password = generate_password(32);
        assert_eq!(password.chars().count(), 32);
        assert!(password.bytes().all(|b| PASSWORD_CHARS.contains(&b)));
    }

    #[test]
    fn test_render_qr_png() {
        let png = render_qr_png("https://example.com").unwrap();
        assert!(png.starts_with(b"\x89PNG\r\n\x1a\n"), "not a PNG header");
    }

    #[test]
    fn test_countdown_bounds() {
        assert_eq!(countdown_seconds("10"), Some(10));
        assert_eq!(countdown_seconds("1"), Some(1));
        assert_eq!(countdown_seconds("60"), Some(60));
        assert_eq!(countdown_seconds("0"), None);
        assert_eq!(countdown_seconds("61"), None);
        assert_eq!(countdown_seconds("soon"), None);
    }

    #[test]
    fn test_convert_units() {
        assert_eq!(convert_units("10 km").unwrap(), "10.00 km = 6.21 mi");
        assert_eq!(convert_units("100 c").unwrap(), "100.00 °C = 212.00 °F");
        assert_eq!(convert_units("32 f").unwrap(), "32.00 °F = 0.00 °C");
        assert!(convert_units("10 lightyears").is_err());
        assert!(convert_units("km 10").is_err());
        assert!(convert_units("").is_err());
    }

    #[test]
    fn test_command_parsing() {
        let cmd = Command::parse("/dice 20", "saathi_bot").unwrap();
        assert_eq!(cmd, Command::Dice("20".to_string()));

        let cmd = Command::parse("/broadcast hello everyone", "saathi_bot").unwrap();
        assert_eq!(cmd, Command::Broadcast("hello everyone".to_string()));

        let cmd = Command::parse("/clearmemory", "saathi_bot").unwrap();
        assert_eq!(cmd, Command::ClearMemory);
    }
}
