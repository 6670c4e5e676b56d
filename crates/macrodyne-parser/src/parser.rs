use std::fmt::Write as _;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use macrodyne_config::{
    AnyConfiguration, CacheConfig, ConfigurationCache, ConfigurationFrame, HeaderFrame,
};
use macrodyne_frame::{FrameType, ProtocolVersion, DEFAULT_MAX_FRAME_SIZE};
use tracing::{debug, info, warn};

use crate::assembler::FrameAssembler;
use crate::decode::{decode_frame, CellDecoder, DataFrame, DecodedFrame, MacrodyneCells};
use crate::error::{ParserError, Result};
use crate::events::FrameEvents;
use crate::header::HeaderContext;
use crate::startup::StartupPublish;

/// Longest descriptor path shown in [`FrameParser::status`].
pub const STATUS_PATH_WIDTH: usize = 51;

/// Default chunk size used by [`FrameParser::read_from`].
pub const DEFAULT_READ_CHUNK: usize = 4096;

/// Parser settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserConfig {
    pub protocol_version: ProtocolVersion,
    /// INI descriptor used to synthesize and refresh the configuration.
    pub descriptor_path: Option<PathBuf>,
    /// Section of the descriptor describing this device.
    pub device_label: String,
    /// Reload the configuration when the descriptor changes.
    pub hot_reload: bool,
    /// Largest frame accepted before its header is treated as malformed. Default: 8 KiB.
    pub max_frame_size: usize,
    /// How often the descriptor is checked for changes. Default: 1s.
    pub reload_poll_interval: Duration,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            protocol_version: ProtocolVersion::default(),
            descriptor_path: None,
            device_label: String::new(),
            hot_reload: false,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            reload_poll_interval: CacheConfig::default().reload_poll_interval,
        }
    }
}

/// Streaming parser for one Macrodyne device.
///
/// Bytes pushed through [`FrameParser::write`] are unstuffed, synchronized,
/// split into frames and decoded. Results go to the channels handed out by
/// the `subscribe_*` methods. Writes must come from one producer, in order.
pub struct FrameParser {
    config: ParserConfig,
    cache: Arc<ConfigurationCache>,
    events: Arc<FrameEvents>,
    cells: Arc<dyn CellDecoder>,
    assembler: FrameAssembler,
    allowed: Vec<FrameType>,
    running: bool,
    startup: Option<StartupPublish>,
    /// Errors raised before anyone could subscribe; flushed by the first start.
    deferred: Vec<ParserError>,
}

impl FrameParser {
    /// Create a parser with default settings.
    pub fn new() -> Self {
        Self::with_config(ParserConfig::default())
    }

    /// Create a parser with explicit settings.
    ///
    /// A descriptor that cannot be read is logged and delivered on the error
    /// channel at the first [`FrameParser::start`]; the parser is still usable.
    pub fn with_config(config: ParserConfig) -> Self {
        let cache = ConfigurationCache::new(CacheConfig {
            reload_poll_interval: config.reload_poll_interval,
            ..CacheConfig::default()
        });
        let events = Arc::new(FrameEvents::new());
        cache.set_observer(events.clone());
        cache.set_device_label(config.device_label.clone());
        cache.set_protocol_version(config.protocol_version);

        let mut parser = Self {
            config,
            cache,
            events,
            cells: Arc::new(MacrodyneCells),
            assembler: FrameAssembler::new(),
            allowed: FrameType::ALL.to_vec(),
            running: false,
            startup: None,
            deferred: Vec::new(),
        };
        parser.apply_descriptor_settings();
        parser
    }

    /// Replace the body decoder used for data and configuration frames.
    pub fn with_cell_decoder(mut self, cells: Arc<dyn CellDecoder>) -> Self {
        self.cells = cells;
        self
    }

    fn apply_descriptor_settings(&mut self) {
        let path = self.config.descriptor_path.clone();
        if let Err(err) = self.cache.set_descriptor_path(path) {
            self.defer(ParserError::Config(err));
        }
        if let Err(err) = self.cache.set_hot_reload(self.config.hot_reload) {
            self.defer(ParserError::Config(err));
        }
    }

    fn defer(&mut self, error: ParserError) {
        warn!(error = %error, "parser error during construction");
        self.deferred.push(error);
    }

    fn report(&self, error: ParserError) {
        warn!(error = %error, "parser error");
        self.events.publish_error(error);
    }

    /// Begin accepting bytes.
    ///
    /// Parsing is restricted to the three supported frame types, the stream
    /// must re-establish sync, and the cached configuration (if any) is
    /// published on a background thread. Errors held from construction are
    /// published first.
    pub fn start(&mut self) {
        self.cancel_startup();
        for error in std::mem::take(&mut self.deferred) {
            self.events.publish_error(error);
        }
        self.allowed = FrameType::ALL.to_vec();
        self.assembler.reset();
        self.running = true;
        self.startup = Some(StartupPublish::spawn(
            Arc::clone(&self.cache),
            Arc::clone(&self.events),
        ));
        info!(version = %self.config.protocol_version, "parser started");
    }

    /// Stop accepting bytes and cancel a pending startup publish.
    pub fn stop(&mut self) {
        self.cancel_startup();
        if self.running {
            info!("parser stopped");
        }
        self.running = false;
    }

    fn cancel_startup(&mut self) {
        if let Some(startup) = self.startup.take() {
            startup.cancel();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Narrow the accepted frame types until the next [`FrameParser::start`].
    pub fn restrict_frames(&mut self, kinds: &[FrameType]) {
        self.allowed = kinds.to_vec();
    }

    /// Push a chunk of raw device bytes.
    ///
    /// Frame and parse errors are reported on the error channel, never
    /// returned. `Err` only signals that the parser is not started.
    pub fn write(&mut self, chunk: &[u8]) -> Result<()> {
        if !self.running {
            return Err(ParserError::NotStarted);
        }
        self.assembler.push(chunk);

        loop {
            let on_image = |image: &[u8]| self.events.publish_image(image);
            let context = HeaderContext {
                allowed: &self.allowed,
                version: self.config.protocol_version,
                max_frame_size: self.config.max_frame_size,
                configuration: self.cache.configuration(),
                header_frame: self.cache.header_frame(),
                cells: &self.cells,
                on_image: &on_image,
            };

            let frame = match self.assembler.next_frame(&context) {
                Ok(Some(frame)) => frame,
                Ok(None) => return Ok(()),
                Err(err) => {
                    self.report(err);
                    self.assembler.resynchronize();
                    continue;
                }
            };

            match decode_frame(&frame.header, &frame.image) {
                Ok(decoded) => self.dispatch(decoded),
                Err(err) => {
                    let resync = err.requires_resync();
                    self.report(err);
                    if resync {
                        self.assembler.reject(&frame);
                    }
                }
            }
        }
    }

    fn dispatch(&self, frame: DecodedFrame) {
        match &frame {
            DecodedFrame::Header(header) => {
                self.cache.set_header_frame(Arc::clone(header));
                debug!(id_code = header.id_code, "header frame cached");
            }
            DecodedFrame::Configuration(configuration) => {
                self.cache
                    .set_configuration(ConfigurationFrame::clone(configuration));
            }
            DecodedFrame::Data(_) => {}
        }
        self.events.publish_frame(&frame);
    }

    /// Feed everything `reader` yields, `chunk_size` bytes at a time.
    pub fn read_from<R: Read>(&mut self, mut reader: R, chunk_size: usize) -> Result<u64> {
        let mut buf = vec![0u8; chunk_size.max(1)];
        let mut total = 0u64;
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => return Ok(total),
                Ok(n) => n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            };
            self.write(&buf[..n])?;
            total += n as u64;
        }
    }

    /// Feed everything an async reader yields.
    #[cfg(feature = "async")]
    pub async fn read_from_async<R>(&mut self, mut reader: R, chunk_size: usize) -> Result<u64>
    where
        R: tokio::io::AsyncRead + Unpin,
    {
        use tokio::io::AsyncReadExt;

        let mut buf = vec![0u8; chunk_size.max(1)];
        let mut total = 0u64;
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                return Ok(total);
            }
            self.write(&buf[..n])?;
            total += n as u64;
        }
    }

    // Settings

    pub fn protocol_version(&self) -> ProtocolVersion {
        self.config.protocol_version
    }

    pub fn set_protocol_version(&mut self, version: ProtocolVersion) {
        self.config.protocol_version = version;
        self.cache.set_protocol_version(version);
    }

    pub fn descriptor_path(&self) -> Option<&Path> {
        self.config.descriptor_path.as_deref()
    }

    /// Set the descriptor path; failures go to the error channel.
    pub fn set_descriptor_path(&mut self, path: Option<PathBuf>) {
        self.config.descriptor_path = path.clone();
        if let Err(err) = self.cache.set_descriptor_path(path) {
            self.report(ParserError::Config(err));
        }
    }

    pub fn device_label(&self) -> &str {
        &self.config.device_label
    }

    pub fn set_device_label(&mut self, label: impl Into<String>) {
        let label = label.into();
        self.cache.set_device_label(label.clone());
        self.config.device_label = label;
    }

    pub fn hot_reload(&self) -> bool {
        self.config.hot_reload
    }

    /// Enable or disable descriptor reloads; failures go to the error channel.
    pub fn set_hot_reload(&mut self, enabled: bool) {
        self.config.hot_reload = enabled;
        if let Err(err) = self.cache.set_hot_reload(enabled) {
            self.report(ParserError::Config(err));
        }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    // Cached state

    /// Replace the cached configuration, deriving foreign ones.
    pub fn set_configuration(
        &self,
        configuration: impl Into<AnyConfiguration>,
    ) -> Arc<ConfigurationFrame> {
        self.cache.set_configuration(configuration)
    }

    pub fn configuration(&self) -> Option<Arc<ConfigurationFrame>> {
        self.cache.configuration()
    }

    pub fn header_frame(&self) -> Option<Arc<HeaderFrame>> {
        self.cache.header_frame()
    }

    /// Reload the configuration from the descriptor now.
    pub fn refresh_configuration(&self) -> Result<Arc<ConfigurationFrame>> {
        Ok(self.cache.refresh_from_descriptor()?)
    }

    pub fn cache(&self) -> &Arc<ConfigurationCache> {
        &self.cache
    }

    pub fn is_synchronized(&self) -> bool {
        self.assembler.is_synchronized()
    }

    /// Multi-line human-readable summary of the parser settings.
    pub fn status(&self) -> String {
        let path = self
            .config
            .descriptor_path
            .as_deref()
            .map(|path| truncate_middle(&path.display().to_string(), STATUS_PATH_WIDTH))
            .unwrap_or_else(|| "(none)".to_string());
        let label = if self.config.device_label.is_empty() {
            "(none)"
        } else {
            &self.config.device_label
        };
        let reload = if self.config.hot_reload {
            "enabled"
        } else {
            "disabled"
        };

        let mut status = String::new();
        for (name, value) in [
            ("Protocol version", self.config.protocol_version.to_string()),
            ("Descriptor file", path),
            ("Device label", label.to_string()),
            ("Auto-reload", reload.to_string()),
        ] {
            let _ = writeln!(status, "{name:>21}: {value}");
        }
        status
    }

    // Subscriptions

    pub fn subscribe_frames(&self) -> Receiver<DecodedFrame> {
        self.events.subscribe_frames()
    }

    pub fn subscribe_data_frames(&self) -> Receiver<Arc<DataFrame>> {
        self.events.subscribe_data_frames()
    }

    pub fn subscribe_header_frames(&self) -> Receiver<Arc<HeaderFrame>> {
        self.events.subscribe_header_frames()
    }

    pub fn subscribe_configuration_frames(&self) -> Receiver<Arc<ConfigurationFrame>> {
        self.events.subscribe_configuration_frames()
    }

    pub fn subscribe_errors(&self) -> Receiver<Arc<ParserError>> {
        self.events.subscribe_errors()
    }

    pub fn subscribe_configuration_changed(&self) -> Receiver<()> {
        self.events.subscribe_configuration_changed()
    }

    pub fn subscribe_frame_images(&self) -> Receiver<Bytes> {
        self.events.subscribe_frame_images()
    }
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for FrameParser {
    fn drop(&mut self) {
        self.cancel_startup();
    }
}

impl io::Write for FrameParser {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        FrameParser::write(self, buf).map_err(io::Error::other)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl std::fmt::Debug for FrameParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameParser")
            .field("config", &self.config)
            .field("running", &self.running)
            .field("synchronized", &self.assembler.is_synchronized())
            .field("allowed", &self.allowed)
            .finish_non_exhaustive()
    }
}

/// Shorten `text` to `width` characters by eliding its middle.
fn truncate_middle(text: &str, width: usize) -> String {
    let count = text.chars().count();
    if count <= width {
        return text.to_string();
    }
    let keep = width.saturating_sub(3);
    let head = keep / 2;
    let tail = keep - head;
    let start: String = text.chars().take(head).collect();
    let end: String = text.chars().skip(count - tail).collect();
    format!("{start}...{end}")
}
