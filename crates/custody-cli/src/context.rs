use std::path::Path;

use anyhow::Context;
use custody_config::CustodyConfig;
use custody_db::service::AuditService;

/// Shared application resources initialized once at startup.
pub struct AppContext {
    pub service: AuditService,
}

impl AppContext {
    /// Open the store named by `config` and apply pending migrations.
    pub async fn init(config: CustodyConfig) -> anyhow::Result<Self> {
        let path = config.store.path.clone();
        if !config.store.is_in_memory()
            && let Some(parent) = Path::new(&path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create store directory {}", parent.display()))?;
        }
        let service = AuditService::open(config)
            .await
            .with_context(|| format!("failed to open audit store at {path}"))?;
        Ok(Self { service })
    }
}

/// Emit warnings for likely mistyped env var keys that silently fell back to defaults.
pub fn warn_unconfigured(config: &CustodyConfig) {
    for warning in collect_unconfigured_warnings(config, std::env::vars()) {
        tracing::warn!("{warning}");
    }
}

fn collect_unconfigured_warnings<I>(config: &CustodyConfig, env: I) -> Vec<String>
where
    I: IntoIterator<Item = (String, String)>,
{
    let env_keys = env.into_iter().map(|(key, _)| key).collect::<Vec<_>>();
    let mut warnings = Vec::new();

    for (section, example) in [
        ("STORE", "CUSTODY_STORE__PATH"),
        ("RETENTION", "CUSTODY_RETENTION__WINDOWS__ADMIN"),
    ] {
        let single = format!("CUSTODY_{section}_");
        let double = format!("CUSTODY_{section}__");
        if env_keys
            .iter()
            .any(|key| key.starts_with(&single) && !key.starts_with(&double))
        {
            warnings.push(format!(
                "CUSTODY_{section}_* env vars are ignored. Use double underscores (example: {example})."
            ));
        }
    }

    if config.store.is_in_memory() {
        warnings.push(
            "store.path is ':memory:'; entries recorded by this process are discarded on exit."
                .to_string(),
        );
    }

    warnings
}
