//! Live graph monitor using the PipeWire registry.
//!
//! PipeWire objects are not thread-safe, so the main loop and the registry
//! listener live on a dedicated thread. Globals are folded into the
//! [`GraphMirror`] as they arrive and forwarded as [`GraphEvent`]s.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::io;
use std::rc::Rc;
use std::sync::Arc;
use std::thread::JoinHandle;

use pipewire::context::ContextRc;
use pipewire::main_loop::MainLoopRc;
use pipewire::registry::GlobalObject;
use pipewire::spa::utils::dict::DictRef;
use pipewire::types::ObjectType;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use soundstreamer_core::event::GraphEvent;
use soundstreamer_core::graph::{Link, LinkState, Node, Port, PortDirection};

use crate::error::{PwError, PwResult};
use crate::mirror::GraphMirror;

/// Handle to the native monitor thread.
pub struct NativeMonitor {
    quit_tx: pipewire::channel::Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl NativeMonitor {
    /// Connect to PipeWire on a new thread and start listening.
    ///
    /// # Errors
    /// Returns an error if the thread cannot be spawned. Connection failures
    /// are reported as [`GraphEvent::Disconnected`].
    pub fn spawn(mirror: Arc<GraphMirror>) -> io::Result<(Self, mpsc::Receiver<GraphEvent>)> {
        let (event_tx, event_rx) = mpsc::channel(256);
        let (quit_tx, quit_rx) = pipewire::channel::channel();

        let thread = std::thread::Builder::new()
            .name("pipewire-native".to_string())
            .spawn(move || {
                if let Err(e) = run_registry_thread(&mirror, &event_tx, quit_rx) {
                    error!(error = %e, "Native graph monitor failed");
                    let _ = event_tx.blocking_send(GraphEvent::Disconnected { reason: e.to_string() });
                }
            })?;

        Ok((Self { quit_tx, thread: Some(thread) }, event_rx))
    }

    /// Quit the PipeWire main loop and wait for the thread.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.quit_tx.send(());
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            error!("Native graph monitor thread panicked");
        }
    }
}

impl Drop for NativeMonitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_registry_thread(
    mirror: &Arc<GraphMirror>,
    event_tx: &mpsc::Sender<GraphEvent>,
    quit_rx: pipewire::channel::Receiver<()>,
) -> PwResult<()> {
    pipewire::init();

    let main_loop = MainLoopRc::new(None)
        .map_err(|e| PwError::MainLoopError(format!("Failed to create main loop: {e}")))?;

    let context = ContextRc::new(&main_loop, None)
        .map_err(|e| PwError::ConnectionFailed(format!("Failed to create context: {e}")))?;

    let core = context
        .connect_rc(None)
        .map_err(|e| PwError::ConnectionFailed(format!("Failed to connect: {e}")))?;

    let registry = core
        .get_registry_rc()
        .map_err(|e| PwError::ConnectionFailed(format!("Failed to get registry: {e}")))?;

    info!("Connected to PipeWire registry");
    let _ = event_tx.blocking_send(GraphEvent::Connected);

    // Node names, for NodeRemoved events
    let nodes: Rc<RefCell<HashMap<u32, String>>> = Rc::new(RefCell::new(HashMap::new()));
    let nodes_remove = Rc::clone(&nodes);

    let mirror_global = Arc::clone(mirror);
    let mirror_remove = Arc::clone(mirror);
    let tx_global = event_tx.clone();
    let tx_remove = event_tx.clone();

    let _listener = registry
        .add_listener_local()
        .global(move |global| {
            if let Some(event) = event_for_global(global) {
                if let GraphEvent::NodeAdded(node) = &event {
                    nodes.borrow_mut().insert(node.id, node.name.clone());
                }
                forward(&mirror_global, &tx_global, event);
            }
        })
        .global_remove(move |id| {
            let event = match nodes_remove.borrow_mut().remove(&id) {
                Some(name) => GraphEvent::NodeRemoved { id, name },
                None => GraphEvent::ObjectRemoved { id },
            };
            forward(&mirror_remove, &tx_remove, event);
        })
        .register();

    let main_loop_quit = main_loop.clone();
    let _quit = quit_rx.attach(main_loop.loop_(), move |()| {
        debug!("Native monitor quit requested");
        main_loop_quit.quit();
    });

    info!("Starting PipeWire main loop");
    main_loop.run();

    info!("PipeWire main loop exited");
    Ok(())
}

fn forward(mirror: &GraphMirror, tx: &mpsc::Sender<GraphEvent>, event: GraphEvent) {
    mirror.apply_event(&event);
    let _ = tx.blocking_send(event);
}

fn event_for_global(global: &GlobalObject<&DictRef>) -> Option<GraphEvent> {
    let props: BTreeMap<String, String> = global
        .props
        .map(|p| p.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
        .unwrap_or_default();
    let number = |key: &str| props.get(key).and_then(|s| s.parse::<u32>().ok());

    match global.type_ {
        ObjectType::Node => {
            let node = Node::from_props(global.id, props);
            debug!(id = node.id, name = %node.name, class = ?node.media_class, "Node added");
            Some(GraphEvent::NodeAdded(node))
        }
        ObjectType::Port => {
            let node_id = number("node.id")?;
            let direction = props.get("port.direction").and_then(|d| PortDirection::parse(d))?;
            Some(GraphEvent::PortAdded(Port {
                id: global.id,
                node_id,
                name: props.get("port.name").cloned().unwrap_or_else(|| "unknown".to_string()),
                direction,
                channel: props.get("audio.channel").cloned(),
                alias: props.get("port.alias").cloned(),
            }))
        }
        ObjectType::Link => {
            let link = Link {
                id: global.id,
                output_node: number("link.output.node")?,
                output_port: number("link.output.port")?,
                input_node: number("link.input.node")?,
                input_port: number("link.input.port")?,
                state: LinkState::Init,
                error: None,
            };
            debug!(id = link.id, output_node = link.output_node, input_node = link.input_node, "Link added");
            Some(GraphEvent::LinkAdded(link))
        }
        _ => None,
    }
}
