//! The single active device configuration and its descriptor reload cycle.
//!
//! Readers on the ingest path take an `Arc` snapshot of the cached
//! configuration and never hold a lock while decoding. Reloads build a fresh
//! frame and swap it into the slot, so a decode in progress keeps reading the
//! configuration it started with.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};

use macrodyne_frame::ProtocolVersion;
use tracing::{debug, info, warn};

use crate::config::CacheConfig;
use crate::descriptor::load_section;
use crate::error::{ConfigError, Result};
use crate::foreign::AnyConfiguration;
use crate::model::{ConfigurationFrame, HeaderFrame};
use crate::watch::FileWatch;

/// Receives notifications from descriptor-triggered reloads.
///
/// Callbacks run on the watcher thread while the reload lock is held.
pub trait ReloadObserver: Send + Sync {
    /// The descriptor file changed and a refresh is about to run.
    fn configuration_changed(&self);

    /// The refresh failed; the previous configuration stays active.
    fn reload_failed(&self, error: ConfigError);

    /// The refresh succeeded.
    fn configuration_refreshed(&self, _configuration: &Arc<ConfigurationFrame>) {}
}

/// Where and how the descriptor file is read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptorSettings {
    pub path: Option<PathBuf>,
    pub device_label: String,
    pub hot_reload: bool,
    pub version: ProtocolVersion,
}

#[derive(Default)]
struct Slot {
    configuration: Option<Arc<ConfigurationFrame>>,
    header_frame: Option<Arc<HeaderFrame>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Holds at most one configuration and one header frame.
pub struct ConfigurationCache {
    slot: RwLock<Slot>,
    generation: AtomicU64,
    settings: Mutex<DescriptorSettings>,
    reload_lock: Mutex<()>,
    watch: Mutex<Option<FileWatch>>,
    observer: RwLock<Option<Arc<dyn ReloadObserver>>>,
    config: CacheConfig,
}

impl ConfigurationCache {
    /// Create an empty cache.
    pub fn new(config: CacheConfig) -> Arc<Self> {
        Arc::new(Self {
            slot: RwLock::new(Slot::default()),
            generation: AtomicU64::new(0),
            settings: Mutex::new(DescriptorSettings::default()),
            reload_lock: Mutex::new(()),
            watch: Mutex::new(None),
            observer: RwLock::new(None),
            config,
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Install the observer notified by reload cycles.
    pub fn set_observer(&self, observer: Arc<dyn ReloadObserver>) {
        *self.observer.write().unwrap_or_else(PoisonError::into_inner) = Some(observer);
    }

    fn observer(&self) -> Option<Arc<dyn ReloadObserver>> {
        self.observer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Snapshot of the cached configuration.
    pub fn configuration(&self) -> Option<Arc<ConfigurationFrame>> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .configuration
            .clone()
    }

    /// Snapshot of the most recent header frame.
    pub fn header_frame(&self) -> Option<Arc<HeaderFrame>> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .header_frame
            .clone()
    }

    /// Incremented every time the cached configuration is replaced.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn store(&self, frame: ConfigurationFrame) -> Arc<ConfigurationFrame> {
        let frame = Arc::new(frame);
        self.slot
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .configuration = Some(Arc::clone(&frame));
        self.generation.fetch_add(1, Ordering::AcqRel);
        frame
    }

    /// Replace the cached configuration.
    ///
    /// Foreign configurations are derived into the native shape first.
    pub fn set_configuration(
        &self,
        configuration: impl Into<AnyConfiguration>,
    ) -> Arc<ConfigurationFrame> {
        let frame = configuration.into().into_native();
        debug!(
            id_code = frame.id_code,
            station = %frame.station_name,
            "configuration cached"
        );
        self.store(frame)
    }

    /// Replace the cached header frame.
    pub fn set_header_frame(&self, header: impl Into<Arc<HeaderFrame>>) -> Arc<HeaderFrame> {
        let header = header.into();
        self.slot
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .header_frame = Some(Arc::clone(&header));
        header
    }

    /// Current descriptor settings.
    pub fn settings(&self) -> DescriptorSettings {
        lock(&self.settings).clone()
    }

    pub fn set_device_label(&self, label: impl Into<String>) {
        lock(&self.settings).device_label = label.into();
    }

    pub fn set_protocol_version(&self, version: ProtocolVersion) {
        lock(&self.settings).version = version;
    }

    /// Record the descriptor path.
    ///
    /// When nothing is cached and the path names an existing file, a default
    /// configuration is synthesized from it. The watch is reinstalled either
    /// way; the first error encountered is returned.
    pub fn set_descriptor_path(self: &Arc<Self>, path: Option<PathBuf>) -> Result<()> {
        lock(&self.settings).path = path.clone();

        let synthesized = match path {
            Some(path) if self.configuration().is_none() && path.is_file() => {
                let _guard = lock(&self.reload_lock);
                self.refresh_locked().map(|frame| {
                    info!(
                        ?path,
                        station = %frame.station_name,
                        "synthesized configuration from descriptor"
                    );
                })
            }
            _ => Ok(()),
        };

        let watched = self.reinstall_watch();
        synthesized.and(watched)
    }

    /// Enable or disable reloading when the descriptor changes.
    pub fn set_hot_reload(self: &Arc<Self>, enabled: bool) -> Result<()> {
        lock(&self.settings).hot_reload = enabled;
        self.reinstall_watch()
    }

    /// Whether a descriptor watch is currently running.
    pub fn is_watching(&self) -> bool {
        lock(&self.watch).is_some()
    }

    /// Tear down any watch and start a new one if hot reload is enabled and
    /// the descriptor path names an existing file.
    pub fn reinstall_watch(self: &Arc<Self>) -> Result<()> {
        let mut slot = lock(&self.watch);
        slot.take();

        let settings = self.settings();
        let path = match settings.path {
            Some(path) if settings.hot_reload && path.is_file() => path,
            _ => return Ok(()),
        };

        let cache: Weak<Self> = Arc::downgrade(self);
        let watch = FileWatch::spawn(&path, self.config.reload_poll_interval, move || {
            if let Some(cache) = cache.upgrade() {
                cache.on_descriptor_changed();
            }
        })
        .map_err(ConfigError::Watch)?;

        debug!(?path, "descriptor watch installed");
        *slot = Some(watch);
        Ok(())
    }

    /// Handle a descriptor change notification.
    ///
    /// Only one reload runs at a time. Failures are reported to the observer
    /// and the previous configuration stays cached.
    pub fn on_descriptor_changed(&self) {
        let _guard = lock(&self.reload_lock);
        let observer = self.observer();
        if let Some(observer) = &observer {
            observer.configuration_changed();
        }

        match self.refresh_locked() {
            Ok(frame) => {
                info!(station = %frame.station_name, "configuration reloaded from descriptor");
                if let Some(observer) = &observer {
                    observer.configuration_refreshed(&frame);
                }
            }
            Err(err) => {
                warn!(error = %err, "descriptor reload failed; keeping previous configuration");
                if let Some(observer) = &observer {
                    observer.reload_failed(err);
                }
            }
        }
    }

    /// Refresh the cached configuration from the descriptor file.
    pub fn refresh_from_descriptor(&self) -> Result<Arc<ConfigurationFrame>> {
        let _guard = lock(&self.reload_lock);
        self.refresh_locked()
    }

    fn refresh_locked(&self) -> Result<Arc<ConfigurationFrame>> {
        let settings = self.settings();
        let path = settings.path.ok_or(ConfigError::NoDescriptor)?;
        let section = load_section(
            &path,
            &settings.device_label,
            self.config.max_descriptor_size,
        )?;

        let frame = match self.configuration() {
            Some(current) => current.refreshed_from(&section, &path, &settings.device_label),
            None => {
                let mut frame = ConfigurationFrame::from_descriptor(
                    &section,
                    &path,
                    &settings.device_label,
                    settings.version,
                );
                frame.header_frame = self.header_frame();
                frame
            }
        };
        frame.validate()?;
        Ok(self.store(frame))
    }
}

impl std::fmt::Debug for ConfigurationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigurationCache")
            .field("generation", &self.generation())
            .field("settings", &self.settings())
            .field("watching", &self.is_watching())
            .finish_non_exhaustive()
    }
}
