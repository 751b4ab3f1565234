use pdfscope_core::CallLimits;
use pdfscope_local::BackendConfig;
use serde::Serialize;

pub(crate) const DEFAULT_MAX_READ_CHARS: usize = 200_000;

fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_u64(key: &str) -> Option<u64> {
    let raw = env(key)?;
    match raw.parse::<u64>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring non-numeric setting");
            None
        }
    }
}

/// Process-wide settings, read once at startup.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ServerConfig {
    pub backend: BackendConfig,
    pub limits: CallLimits,
    pub max_read_chars: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            limits: CallLimits::default(),
            max_read_chars: DEFAULT_MAX_READ_CHARS,
        }
    }
}

impl ServerConfig {
    pub(crate) fn from_env() -> Self {
        let d = Self::default();
        let page_text_timeout_ms = env_u64("PDFSCOPE_PAGE_TEXT_TIMEOUT_MS")
            .unwrap_or(d.limits.page_text_timeout_ms)
            .clamp(50, 300_000);
        Self {
            backend: BackendConfig::from_env(),
            limits: CallLimits {
                page_text_timeout_ms,
            },
            max_read_chars: env_u64("PDFSCOPE_MAX_READ_CHARS")
                .map(|v| v as usize)
                .unwrap_or(d.max_read_chars)
                .max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Env vars are process-global; serialize tests that touch them.
    static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    #[test]
    fn from_env_clamps_and_falls_back() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        std::env::set_var("PDFSCOPE_PAGE_TEXT_TIMEOUT_MS", "5");
        std::env::set_var("PDFSCOPE_MAX_READ_CHARS", "lots");
        let cfg = ServerConfig::from_env();
        std::env::remove_var("PDFSCOPE_PAGE_TEXT_TIMEOUT_MS");
        std::env::remove_var("PDFSCOPE_MAX_READ_CHARS");

        assert_eq!(cfg.limits.page_text_timeout_ms, 50);
        assert_eq!(cfg.max_read_chars, DEFAULT_MAX_READ_CHARS);
    }

    #[test]
    fn defaults_match_documented_values() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.limits.page_text_timeout_ms, 30_000);
        assert_eq!(cfg.max_read_chars, 200_000);
        assert_eq!(cfg.backend.max_file_bytes, 256 * 1024 * 1024);
    }
}
