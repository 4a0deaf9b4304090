use chrono::NaiveTime;
use std::collections::HashSet;
use std::time::Duration;

use crate::domain::{Account, AccountMode, Instrument};
use crate::error::{Result, TraderError};
use crate::risk::Thresholds;
use crate::time::parse_hhmmss;

const REAL_BASE_URL: &str = "https://openapi.koreainvestment.com:9443";
const DEMO_BASE_URL: &str = "https://openapivts.koreainvestment.com:29443";

#[derive(Debug, Clone)]
pub struct Config {
    // Universe
    pub instruments: Vec<Instrument>,
    pub thresholds: Thresholds,

    // Runtime
    pub replay_mode: bool,
    pub account_mode: AccountMode,
    pub dry_run: bool,
    pub tz: String,
    pub poll_interval: Duration,
    pub replay_step_delay: Duration,

    // Replay data collection
    pub replay_anchor: NaiveTime,
    pub market_open: NaiveTime,
    pub max_pages: usize,
    pub page_delay: Duration,

    // Broker
    pub kis_base_url: String,
    pub app_key: String,
    pub app_secret: String,
    pub access_token: String,
    pub account: Account,
    pub call_timeout: Duration,
    pub request_spacing: Duration,

    // Alerts
    pub slack_webhook_url: Option<String>,
}

fn env_bool(get: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> Result<bool> {
    match get(key).map(|s| s.trim().to_lowercase()) {
        None => Ok(default),
        Some(v) if v.is_empty() => Ok(default),
        Some(v) if v == "1" || v == "true" || v == "yes" || v == "y" || v == "on" => Ok(true),
        Some(v) if v == "0" || v == "false" || v == "no" || v == "n" || v == "off" => Ok(false),
        Some(v) => Err(TraderError::config(format!("{key}: expected a boolean, got {v:?}"))),
    }
}

/// Missing keys fall back to the default; present but malformed values are errors.
fn env_parse<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T> {
    match get(key).map(|s| s.trim().to_string()) {
        None => Ok(default),
        Some(v) if v.is_empty() => Ok(default),
        Some(v) => v
            .parse()
            .map_err(|_| TraderError::config(format!("{key}: cannot parse {v:?}"))),
    }
}

fn env_time(get: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> Result<NaiveTime> {
    let raw = get(key).unwrap_or_else(|| default.to_string());
    parse_hhmmss(&raw).ok_or_else(|| TraderError::config(format!("{key}: expected HHMMSS, got {raw:?}")))
}

fn env_required(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    get(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| TraderError::config(format!("{key} is required")))
}

/// Parses `code:qty,code:qty`. A bare code means quantity 1.
pub fn parse_instruments(raw: &str) -> Result<Vec<Instrument>> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for item in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (code, qty) = match item.split_once(':') {
            Some((code, qty)) => {
                let qty = qty
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| TraderError::config(format!("invalid quantity in {item:?}")))?;
                (code.trim(), qty)
            }
            None => (item, 1),
        };
        if code.is_empty() {
            return Err(TraderError::config(format!("empty instrument code in {item:?}")));
        }
        if qty == 0 {
            return Err(TraderError::config(format!("quantity must be positive for {code}")));
        }
        if !seen.insert(code.to_string()) {
            return Err(TraderError::config(format!("duplicate instrument {code}")));
        }
        out.push(Instrument { code: code.to_string(), quantity: qty });
    }

    if out.is_empty() {
        return Err(TraderError::config("instrument set is empty"));
    }
    Ok(out)
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        // Universe
        let instruments = parse_instruments(&get("MT_INSTRUMENTS").unwrap_or_default())?;
        let thresholds = Thresholds {
            buy_threshold: env_parse(&get, "MT_BUY_THRESHOLD", 0.005)?,
            stop_loss_threshold: env_parse(&get, "MT_STOP_LOSS_THRESHOLD", -0.01)?,
            trailing_stop_threshold: env_parse(&get, "MT_TRAILING_STOP_THRESHOLD", -0.005)?,
        };
        thresholds.validate()?;

        // Runtime
        let replay_mode = env_bool(&get, "MT_REPLAY_MODE", true)?;
        let account_mode = match get("MT_ACCOUNT_MODE") {
            Some(raw) => raw.parse::<AccountMode>().map_err(TraderError::config)?,
            None => AccountMode::Demo,
        };
        let dry_run = env_bool(&get, "DRY_RUN", true)?;
        let tz = get("MT_TZ").unwrap_or_else(|| "Asia/Seoul".to_string());
        if tz.parse::<chrono_tz::Tz>().is_err() {
            return Err(TraderError::config(format!("invalid tz: {tz}")));
        }
        let poll_interval = Duration::from_secs(env_parse(&get, "MT_POLL_INTERVAL_SECS", 2u64)?);
        if poll_interval.is_zero() {
            return Err(TraderError::config("MT_POLL_INTERVAL_SECS must be positive"));
        }
        let replay_step_delay = Duration::from_millis(env_parse(&get, "MT_REPLAY_STEP_DELAY_MS", 100u64)?);

        // Replay data collection
        let replay_anchor = env_time(&get, "MT_REPLAY_ANCHOR", "153000")?;
        let market_open = env_time(&get, "MT_MARKET_OPEN", "090000")?;
        if replay_anchor < market_open {
            return Err(TraderError::config("MT_REPLAY_ANCHOR is before MT_MARKET_OPEN"));
        }
        let max_pages = env_parse(&get, "MT_MAX_PAGES", 12usize)?;
        if max_pages == 0 {
            return Err(TraderError::config("MT_MAX_PAGES must be positive"));
        }
        let page_delay = Duration::from_millis(env_parse(&get, "MT_PAGE_DELAY_MS", 1000u64)?);

        // Broker
        let kis_base_url = get("KIS_BASE_URL").unwrap_or_else(|| {
            match account_mode {
                AccountMode::Real => REAL_BASE_URL,
                AccountMode::Demo => DEMO_BASE_URL,
            }
            .to_string()
        });
        let app_key = env_required(&get, "KIS_APP_KEY")?;
        let app_secret = env_required(&get, "KIS_APP_SECRET")?;
        let access_token = env_required(&get, "KIS_ACCESS_TOKEN")?;
        let account_number = if dry_run {
            get("KIS_ACCOUNT_NO").unwrap_or_default()
        } else {
            env_required(&get, "KIS_ACCOUNT_NO")?
        };
        let account = Account {
            number: account_number,
            product_code: get("KIS_ACCOUNT_PRODUCT").unwrap_or_else(|| "01".to_string()),
        };
        let call_timeout = Duration::from_millis(env_parse(&get, "MT_CALL_TIMEOUT_MS", 5000u64)?);
        if call_timeout.is_zero() {
            return Err(TraderError::config("MT_CALL_TIMEOUT_MS must be positive"));
        }
        let default_spacing = match account_mode {
            AccountMode::Real => 60u64,
            AccountMode::Demo => 550u64,
        };
        let request_spacing =
            Duration::from_millis(env_parse(&get, "MT_REQUEST_SPACING_MS", default_spacing)?);

        // Alerts
        let slack_webhook_url = get("SLACK_WEBHOOK_URL").filter(|v| !v.trim().is_empty());

        Ok(Self {
            instruments,
            thresholds,
            replay_mode,
            account_mode,
            dry_run,
            tz,
            poll_interval,
            replay_step_delay,
            replay_anchor,
            market_open,
            max_pages,
            page_delay,
            kis_base_url,
            app_key,
            app_secret,
            access_token,
            account,
            call_timeout,
            request_spacing,
            slack_webhook_url,
        })
    }
}
