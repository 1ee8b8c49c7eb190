use once_cell::sync::OnceCell;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::{
    fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter,
};

/// Target used by the HTTP access log middleware.
pub const ACCESS_TARGET: &str = "http.access";

static ACCESS_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

/// Install the global subscriber. Safe to call more than once; later calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    install_console(filter, access_roll_from_env());
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AccessRoll {
    dir: String,
    prefix: String,
    rotation: Rotation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rotation {
    Minutely,
    Hourly,
    Daily,
}

impl Rotation {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "hourly" => Rotation::Hourly,
            "minutely" => Rotation::Minutely,
            _ => Rotation::Daily,
        }
    }
}

fn access_roll_from_env() -> Option<AccessRoll> {
    if std::env::var("AVA_ACCESS_LOG_ROLL").ok().as_deref() != Some("1") {
        return None;
    }
    let dir = std::env::var("AVA_ACCESS_LOG_DIR")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| "logs".to_string());
    let prefix = std::env::var("AVA_ACCESS_LOG_PREFIX").unwrap_or_else(|_| "http-access".into());
    let rotation = std::env::var("AVA_ACCESS_LOG_ROTATION").unwrap_or_else(|_| "daily".into());
    Some(AccessRoll {
        dir,
        prefix,
        rotation: Rotation::parse(&rotation),
    })
}

fn install_console(filter: EnvFilter, roll: Option<AccessRoll>) {
    let fmt_layer = fmt::layer();
    let registry = tracing_subscriber::registry().with(fmt_layer.with_filter(filter));
    match roll {
        Some(roll) => {
            if std::fs::create_dir_all(&roll.dir).is_err() {
                tracing::warn!(directory = %roll.dir, "failed to create access log directory");
            }
            let writer = match roll.rotation {
                Rotation::Hourly => tracing_appender::rolling::hourly(&roll.dir, &roll.prefix),
                Rotation::Minutely => tracing_appender::rolling::minutely(&roll.dir, &roll.prefix),
                Rotation::Daily => tracing_appender::rolling::daily(&roll.dir, &roll.prefix),
            };
            let (nb, guard) = tracing_appender::non_blocking(writer);
            let _ = ACCESS_GUARD.set(guard);
            let targets = Targets::new().with_target(ACCESS_TARGET, tracing::Level::INFO);
            let access_layer = fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(nb)
                .with_filter(targets);
            let _ = registry.with(access_layer).try_init();
        }
        None => {
            let _ = registry.try_init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_defaults_to_daily() {
        assert_eq!(Rotation::parse("HOURLY"), Rotation::Hourly);
        assert_eq!(Rotation::parse("minutely"), Rotation::Minutely);
        assert_eq!(Rotation::parse("weekly"), Rotation::Daily);
    }

    #[test]
    fn init_twice_is_harmless() {
        init();
        init();
        tracing::info!(target: "ava::test", "subscriber installed");
    }
}
