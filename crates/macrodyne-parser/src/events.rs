//! Subscriber fan-out for parsed frames and parser notifications.
//!
//! Each event kind keeps its own list of channel senders. Every decoded frame
//! goes to the generic frame subscribers first, then to exactly one of the
//! kind-specific lists. Senders whose receiver was dropped are pruned on the
//! next delivery.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use macrodyne_config::{ConfigError, ConfigurationFrame, HeaderFrame, ReloadObserver};
use tracing::trace;

use crate::decode::{DataFrame, DecodedFrame};
use crate::error::ParserError;

#[derive(Default)]
struct Subscribers {
    frames: Vec<Sender<DecodedFrame>>,
    data: Vec<Sender<Arc<DataFrame>>>,
    headers: Vec<Sender<Arc<HeaderFrame>>>,
    configurations: Vec<Sender<Arc<ConfigurationFrame>>>,
    errors: Vec<Sender<Arc<ParserError>>>,
    configuration_changed: Vec<Sender<()>>,
    images: Vec<Sender<Bytes>>,
}

/// Delivers `value` to every live sender and returns how many received it.
fn broadcast<T: Clone>(senders: &mut Vec<Sender<T>>, value: T) -> usize {
    senders.retain(|sender| sender.send(value.clone()).is_ok());
    senders.len()
}

/// Event hub shared by the parser, the startup publish and reload callbacks.
#[derive(Default)]
pub struct FrameEvents {
    subscribers: Mutex<Subscribers>,
}

impl FrameEvents {
    pub fn new() -> Self {
        Self::default()
    }

    fn subscribers(&self) -> MutexGuard<'_, Subscribers> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Every decoded frame, regardless of kind.
    pub fn subscribe_frames(&self) -> Receiver<DecodedFrame> {
        let (tx, rx) = mpsc::channel();
        self.subscribers().frames.push(tx);
        rx
    }

    pub fn subscribe_data_frames(&self) -> Receiver<Arc<DataFrame>> {
        let (tx, rx) = mpsc::channel();
        self.subscribers().data.push(tx);
        rx
    }

    pub fn subscribe_header_frames(&self) -> Receiver<Arc<HeaderFrame>> {
        let (tx, rx) = mpsc::channel();
        self.subscribers().headers.push(tx);
        rx
    }

    pub fn subscribe_configuration_frames(&self) -> Receiver<Arc<ConfigurationFrame>> {
        let (tx, rx) = mpsc::channel();
        self.subscribers().configurations.push(tx);
        rx
    }

    /// Parsing and reload errors.
    pub fn subscribe_errors(&self) -> Receiver<Arc<ParserError>> {
        let (tx, rx) = mpsc::channel();
        self.subscribers().errors.push(tx);
        rx
    }

    /// Fired when the descriptor changed, before the refresh runs.
    pub fn subscribe_configuration_changed(&self) -> Receiver<()> {
        let (tx, rx) = mpsc::channel();
        self.subscribers().configuration_changed.push(tx);
        rx
    }

    /// Complete frame images as seen by the header parser.
    pub fn subscribe_frame_images(&self) -> Receiver<Bytes> {
        let (tx, rx) = mpsc::channel();
        self.subscribers().images.push(tx);
        rx
    }

    /// Whether anyone listens for frame images.
    pub fn wants_images(&self) -> bool {
        !self.subscribers().images.is_empty()
    }

    /// Generic event followed by exactly one kind-specific event.
    pub fn publish_frame(&self, frame: &DecodedFrame) {
        let mut subscribers = self.subscribers();
        broadcast(&mut subscribers.frames, frame.clone());
        let delivered = match frame {
            DecodedFrame::Data(data) => broadcast(&mut subscribers.data, Arc::clone(data)),
            DecodedFrame::Header(header) => {
                broadcast(&mut subscribers.headers, Arc::clone(header))
            }
            DecodedFrame::Configuration(configuration) => {
                broadcast(&mut subscribers.configurations, Arc::clone(configuration))
            }
        };
        trace!(kind = %frame.frame_type(), delivered, "frame published");
    }

    /// Kind-specific configuration event only.
    pub fn publish_configuration(&self, configuration: &Arc<ConfigurationFrame>) {
        broadcast(
            &mut self.subscribers().configurations,
            Arc::clone(configuration),
        );
    }

    pub fn publish_error(&self, error: ParserError) {
        broadcast(&mut self.subscribers().errors, Arc::new(error));
    }

    pub fn publish_image(&self, image: &[u8]) {
        let mut subscribers = self.subscribers();
        if !subscribers.images.is_empty() {
            broadcast(&mut subscribers.images, Bytes::copy_from_slice(image));
        }
    }

    pub fn publish_configuration_changed(&self) {
        broadcast(&mut self.subscribers().configuration_changed, ());
    }
}

impl ReloadObserver for FrameEvents {
    fn configuration_changed(&self) {
        self.publish_configuration_changed();
    }

    fn reload_failed(&self, error: ConfigError) {
        self.publish_error(ParserError::Config(error));
    }
}

impl std::fmt::Debug for FrameEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let subscribers = self.subscribers();
        f.debug_struct("FrameEvents")
            .field("frames", &subscribers.frames.len())
            .field("data", &subscribers.data.len())
            .field("headers", &subscribers.headers.len())
            .field("configurations", &subscribers.configurations.len())
            .field("errors", &subscribers.errors.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::DataCell;
    use macrodyne_frame::ProtocolVersion;

    fn data_frame() -> DecodedFrame {
        let configuration = Arc::new(ConfigurationFrame::new(1, "UNIT"));
        DecodedFrame::Data(Arc::new(DataFrame {
            id_code: 1,
            station_name: "UNIT".to_string(),
            version: ProtocolVersion::M,
            cell: DataCell {
                status: 0,
                sample_counter: None,
                timestamp: None,
                phasors: Vec::new(),
                frequency_deviation: 0,
                dfdt: 0,
                digitals: Vec::new(),
            },
            configuration,
        }))
    }

    fn header_frame() -> DecodedFrame {
        DecodedFrame::Header(Arc::new(HeaderFrame {
            id_code: 1,
            unit_description: "UNIT".to_string(),
            version: ProtocolVersion::M,
        }))
    }

    fn configuration_frame() -> DecodedFrame {
        DecodedFrame::Configuration(Arc::new(ConfigurationFrame::new(1, "UNIT")))
    }

    #[test]
    fn exactly_one_kind_event_per_frame() {
        let events = FrameEvents::new();
        let frames = events.subscribe_frames();
        let data = events.subscribe_data_frames();
        let headers = events.subscribe_header_frames();
        let configurations = events.subscribe_configuration_frames();

        for frame in [data_frame(), header_frame(), configuration_frame()] {
            events.publish_frame(&frame);

            let generic = frames.try_recv().expect("generic event should fire");
            assert_eq!(generic.frame_type(), frame.frame_type());
            assert!(frames.try_recv().is_err());

            let fired = [
                data.try_recv().is_ok(),
                headers.try_recv().is_ok(),
                configurations.try_recv().is_ok(),
            ];
            assert_eq!(fired.iter().filter(|hit| **hit).count(), 1);
            let expected = match frame {
                DecodedFrame::Data(_) => 0,
                DecodedFrame::Header(_) => 1,
                DecodedFrame::Configuration(_) => 2,
            };
            assert!(fired[expected]);
        }
    }

    #[test]
    fn no_kind_subscriber_means_only_generic() {
        let events = FrameEvents::new();
        let frames = events.subscribe_frames();
        events.publish_frame(&header_frame());
        assert!(frames.try_recv().is_ok());
    }

    #[test]
    fn dropped_receivers_are_pruned() {
        let events = FrameEvents::new();
        let kept = events.subscribe_errors();
        drop(events.subscribe_errors());

        events.publish_error(ParserError::MissingConfiguration);
        assert!(matches!(
            *kept.try_recv().unwrap(),
            ParserError::MissingConfiguration
        ));
        assert_eq!(events.subscribers().errors.len(), 1);
    }

    #[test]
    fn reload_observer_routes_to_channels() {
        let events = FrameEvents::new();
        let changed = events.subscribe_configuration_changed();
        let errors = events.subscribe_errors();

        ReloadObserver::configuration_changed(&events);
        events.reload_failed(ConfigError::NoDescriptor);

        assert!(changed.try_recv().is_ok());
        assert!(matches!(
            *errors.try_recv().unwrap(),
            ParserError::Config(ConfigError::NoDescriptor)
        ));
    }

    #[test]
    fn images_are_only_copied_when_subscribed() {
        let events = FrameEvents::new();
        assert!(!events.wants_images());
        events.publish_image(&[0xAA, 0x00]);

        let images = events.subscribe_frame_images();
        events.publish_image(&[0xBB, 0x48]);
        assert_eq!(images.try_recv().unwrap().as_ref(), &[0xBB, 0x48]);
    }
}
