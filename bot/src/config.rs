//! Command-line and environment configuration.

use clap::Parser;
use std::path::PathBuf;

use crate::media::ErrorPolicy;

/// Plays a media file into a call room, with spoken scene descriptions and
/// data-channel captions.
#[derive(Parser, Debug)]
#[command(name = "roomcast")]
#[command(about = "Media playback bot for call rooms", long_about = None)]
#[command(version)]
pub struct Config {
    /// Room URL to join
    #[arg(short = 'u', long, env = "ROOM_URL")]
    pub url: String,

    /// Meeting token for the room
    #[arg(short = 'k', long, env = "ROOM_TOKEN", default_value = "")]
    pub token: String,

    /// Media file to play into the room
    #[arg(short = 'f', long)]
    pub file: PathBuf,

    /// Display name the bot joins with
    #[arg(long, default_value = "Media Assistant")]
    pub bot_name: String,

    /// Minimum seconds between vision descriptions
    #[arg(long, default_value_t = 10)]
    pub vision_period: u64,

    /// Vision inference endpoint
    #[arg(long, default_value = "http://127.0.0.1:8000/describe")]
    pub vision_url: String,

    /// ElevenLabs API key
    #[arg(long, env = "ELEVENLABS_API_KEY", hide_env_values = true)]
    pub elevenlabs_api_key: String,

    /// ElevenLabs voice
    #[arg(long, default_value = "pNInz6obpgDQGcFmaJgB")]
    pub voice_id: String,

    /// Session duration limit in minutes
    #[arg(long, default_value_t = 5)]
    pub duration_minutes: u64,

    /// Keep playing after decode backend errors instead of stopping
    #[arg(long)]
    pub best_effort: bool,
}

impl Config {
    pub fn error_policy(&self) -> ErrorPolicy {
        if self.best_effort {
            ErrorPolicy::BestEffort
        } else {
            ErrorPolicy::FailFast
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Vec<&'static str> {
        vec![
            "roomcast",
            "-u",
            "https://example.daily.co/room",
            "-f",
            "/tmp/clip.mp4",
            "--elevenlabs-api-key",
            "key",
        ]
    }

    #[test]
    fn test_defaults() {
        let config = Config::try_parse_from(base_args()).unwrap();
        assert_eq!(config.url, "https://example.daily.co/room");
        assert_eq!(config.file, PathBuf::from("/tmp/clip.mp4"));
        assert_eq!(config.token, "");
        assert_eq!(config.bot_name, "Media Assistant");
        assert_eq!(config.vision_period, 10);
        assert_eq!(config.duration_minutes, 5);
        assert!(!config.best_effort);
        assert_eq!(config.error_policy(), ErrorPolicy::FailFast);
    }

    #[test]
    fn test_best_effort_flag() {
        let mut args = base_args();
        args.push("--best-effort");
        let config = Config::try_parse_from(args).unwrap();
        assert_eq!(config.error_policy(), ErrorPolicy::BestEffort);
    }

    #[test]
    fn test_file_is_required() {
        let result = Config::try_parse_from([
            "roomcast",
            "-u",
            "https://example.daily.co/room",
            "--elevenlabs-api-key",
            "key",
        ]);
        assert!(result.is_err());
    }
}
