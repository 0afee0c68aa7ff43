//! Providers describing the local installation
//!
//! The connection and delivery code never reads ambient process state on its
//! own; it asks these providers for a fresh snapshot on every request.

use std::sync::Arc;

use crate::config::SiteConfig;
use crate::types::{CoreData, InstalledPlugin};

/// Supplies the site snapshot sent with handshakes and event batches.
pub trait CoreDataProvider: Send + Sync {
    /// Build a fresh snapshot of the installation
    fn core_data(&self) -> CoreData;
}

/// Supplies the installed-plugin inventory sent with handshakes.
pub trait PluginInventoryProvider: Send + Sync {
    /// Collect the currently installed plugins
    fn collect(&self) -> Vec<InstalledPlugin>;
}

/// The providers a connection needs, injected at construction.
#[derive(Clone)]
pub struct SiteProviders {
    pub core_data: Arc<dyn CoreDataProvider>,
    /// Inventory is optional; handshakes omit `plugins` without it.
    pub plugins: Option<Arc<dyn PluginInventoryProvider>>,
}

impl SiteProviders {
    /// Providers backed by the `[site]` configuration section.
    pub fn configured(config: SiteConfig) -> Self {
        let site = Arc::new(ConfiguredSite::new(config));
        Self {
            core_data: site.clone(),
            plugins: Some(site),
        }
    }
}

/// Site description backed by the `[site]` configuration section.
#[derive(Debug, Clone)]
pub struct ConfiguredSite {
    config: SiteConfig,
}

impl ConfiguredSite {
    pub fn new(config: SiteConfig) -> Self {
        Self { config }
    }
}

impl CoreDataProvider for ConfiguredSite {
    fn core_data(&self) -> CoreData {
        let site = &self.config;

        CoreData {
            brand: slugify(&site.brand),
            cache_level: site.cache_level,
            cloudflare: site.cloudflare,
            module_version: site.module_version.clone(),
            email: site.admin_email.clone(),
            hostname: site.hostname.clone().unwrap_or_else(machine_hostname),
            database_version: site.database_version.clone(),
            origin: site.origin.clone(),
            runtime_version: site.runtime_version.clone(),
            plugin_version: site.plugin_version.clone(),
            url: site.url.clone(),
            username: site.username.clone().unwrap_or_else(process_owner),
            platform_version: site.platform_version.clone(),
            server_path: site.server_path.clone(),
            extra: Default::default(),
        }
    }
}

impl PluginInventoryProvider for ConfiguredSite {
    fn collect(&self) -> Vec<InstalledPlugin> {
        self.config.plugins.clone()
    }
}

/// Lowercase, dash-separated form of a brand name.
fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut pending_dash = false;

    for c in value.trim().chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug
}

/// Best-effort machine hostname.
fn machine_hostname() -> String {
    if let Ok(name) = std::env::var("HOSTNAME") {
        if !name.trim().is_empty() {
            return name.trim().to_string();
        }
    }

    std::fs::read_to_string("/etc/hostname")
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

/// Best-effort name of the user owning this process.
fn process_owner() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_default()
}
