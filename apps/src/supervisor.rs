//
// Copyright (c) Dell Inc., or its subsidiaries. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//

//! Starts the pipeline, dispatches bus messages until told to quit, and always returns the pipeline to the Null state.

use crate::bus::{BusAction, BusEvent, Termination, handle_bus_event};
use gst::prelude::*;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
#[allow(unused_imports)]
use tracing::{error, warn, info, debug, trace};

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Pipeline has no bus")]
    NoBus,
    #[error("Unable to watch the pipeline bus: {0}")]
    BusWatch(#[from] glib::BoolError),
    #[error("Unable to acquire the event loop context: {0}")]
    MainContext(#[source] glib::BoolError),
    #[error("Unable to set the pipeline to the `{state:?}` state{}", .detail.as_ref().map(|d| format!(": {}", d)).unwrap_or_default())]
    StateChange { state: gst::State, detail: Option<String> },
    #[error("Event loop stopped without a reason")]
    LoopExited,
}

/// Handler invoked for every bus event.
pub type BusHandler = fn(&BusEvent) -> BusAction;

/// The operations the supervisor performs on a pipeline.
pub trait Supervised {
    /// Diagnostic only. Property changes of all children are posted as property-notify messages.
    fn watch_property_changes(&self);
    fn set_playing(&self) -> Result<(), SupervisorError>;
    fn set_null(&self) -> Result<(), SupervisorError>;
}

impl Supervised for gst::Pipeline {
    fn watch_property_changes(&self) {
        let _ = self.add_property_deep_notify_watch(None, true);
    }

    fn set_playing(&self) -> Result<(), SupervisorError> {
        self.set_state(gst::State::Playing).map_err(|_| {
            // The element that failed usually posted an error message describing why.
            let detail = self
                .bus()
                .and_then(|bus| bus.pop_filtered(&[gst::MessageType::Error]))
                .and_then(|msg| match msg.view() {
                    gst::MessageView::Error(err) => Some(match err.debug() {
                        Some(debug) => format!("{} ({})", err.error(), debug),
                        None => err.error().to_string(),
                    }),
                    _ => None,
                });
            SupervisorError::StateChange { state: gst::State::Playing, detail }
        })?;
        Ok(())
    }

    fn set_null(&self) -> Result<(), SupervisorError> {
        self.set_state(gst::State::Null)
            .map_err(|_| SupervisorError::StateChange { state: gst::State::Null, detail: None })?;
        Ok(())
    }
}

/// A blocking loop that feeds events to a handler until the handler asks to quit.
pub trait EventLoop {
    fn run(&mut self, handler: BusHandler) -> Result<Termination, SupervisorError>;
}

#[derive(Default)]
struct LoopState {
    termination: Option<Termination>,
    panic: Option<Box<dyn Any + Send + 'static>>,
}

/// Quits a running [GstBusLoop] from another thread.
#[derive(Clone)]
pub struct QuitHandle {
    main_loop: glib::MainLoop,
    state: Arc<Mutex<LoopState>>,
}

impl QuitHandle {
    /// Stops the loop as if the handler had returned `Quit(Interrupted)`.
    pub fn interrupt(&self) {
        info!("Interrupted");
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.termination.is_none() {
            state.termination = Some(Termination::Interrupted);
        }
        self.main_loop.quit();
    }
}

/// Runs a GLib main loop with a watch on a GStreamer bus.
pub struct GstBusLoop {
    bus: gst::Bus,
    main_loop: glib::MainLoop,
    state: Arc<Mutex<LoopState>>,
}

impl GstBusLoop {
    pub fn new(bus: gst::Bus) -> Self {
        GstBusLoop {
            bus,
            main_loop: glib::MainLoop::new(Some(&glib::MainContext::new()), false),
            state: Arc::new(Mutex::new(LoopState::default())),
        }
    }

    pub fn for_pipeline(pipeline: &gst::Pipeline) -> Result<Self, SupervisorError> {
        Ok(Self::new(pipeline.bus().ok_or(SupervisorError::NoBus)?))
    }

    pub fn quit_handle(&self) -> QuitHandle {
        QuitHandle {
            main_loop: self.main_loop.clone(),
            state: self.state.clone(),
        }
    }

    fn dispatch(&self, handler: BusHandler) -> Result<Termination, SupervisorError> {
        let main_loop = self.main_loop.clone();
        let state = self.state.clone();
        // The watch is removed when the guard is dropped at the end of this function.
        let _watch = self.bus.add_watch(move |_, msg| {
            let event = BusEvent::from(msg);
            trace!("Bus message: {:?}", event);
            // Unwinding into GLib would abort the process, so the panic is carried back to run().
            let action = panic::catch_unwind(AssertUnwindSafe(|| handler(&event)));
            match action {
                Ok(BusAction::Continue) => (),
                Ok(BusAction::Quit(termination)) => {
                    let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                    if state.termination.is_none() {
                        state.termination = Some(termination);
                    }
                    main_loop.quit();
                }
                Err(payload) => {
                    let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                    if state.panic.is_none() {
                        state.panic = Some(payload);
                    }
                    main_loop.quit();
                }
            }
            glib::ControlFlow::Continue
        })?;

        // Quitting a loop that is not running yet has no effect, so a termination recorded before
        // run() is picked up by the first dispatch of the running loop.
        let pending = {
            let main_loop = self.main_loop.clone();
            let state = self.state.clone();
            glib::idle_source_new(None, glib::Priority::DEFAULT, move || {
                if state.lock().unwrap_or_else(PoisonError::into_inner).termination.is_some() {
                    main_loop.quit();
                }
                glib::ControlFlow::Break
            })
        };
        pending.attach(Some(&self.main_loop.context()));
        self.main_loop.run();
        pending.destroy();

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(payload) = state.panic.take() {
            drop(state);
            panic::resume_unwind(payload);
        }
        state.termination.take().ok_or(SupervisorError::LoopExited)
    }
}

impl EventLoop for GstBusLoop {
    fn run(&mut self, handler: BusHandler) -> Result<Termination, SupervisorError> {
        // The bus watch attaches to the thread default context.
        let context = self.main_loop.context();
        context
            .with_thread_default(|| self.dispatch(handler))
            .map_err(SupervisorError::MainContext)?
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}

fn force_null<P: Supervised>(pipeline: &P) {
    if let Err(err) = pipeline.set_null() {
        error!("Cleanup failed: {}", err);
    }
}

/// Plays `pipeline` until `event_loop` terminates, then sets it to Null.
///
/// The pipeline is set to Null on every exit path. An error from the loop is returned after cleanup
/// and a panic is resumed after cleanup.
pub fn supervise<P, L>(pipeline: &P, event_loop: &mut L) -> Result<Termination, SupervisorError>
where
    P: Supervised,
    L: EventLoop,
{
    // This will cause property changes to be logged as property-notify messages.
    pipeline.watch_property_changes();

    info!("Starting pipeline");
    if let Err(err) = pipeline.set_playing() {
        error!("{}", err);
        force_null(pipeline);
        return Err(err);
    }

    match panic::catch_unwind(AssertUnwindSafe(|| event_loop.run(handle_bus_event))) {
        Ok(Ok(termination)) => {
            info!("Stopping pipeline; termination={:?}", termination);
            pipeline.set_null()?;
            info!("END");
            Ok(termination)
        }
        Ok(Err(err)) => {
            error!("Event loop failed: {}", err);
            force_null(pipeline);
            Err(err)
        }
        Err(payload) => {
            error!("Event loop panicked: {}", panic_message(payload.as_ref()));
            force_null(pipeline);
            panic::resume_unwind(payload)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct FakePipeline {
        watched: RefCell<bool>,
        states: RefCell<Vec<gst::State>>,
        fail_playing: bool,
    }

    impl FakePipeline {
        fn last_state(&self) -> Option<gst::State> {
            self.states.borrow().last().copied()
        }
    }

    impl Supervised for FakePipeline {
        fn watch_property_changes(&self) {
            *self.watched.borrow_mut() = true;
        }

        fn set_playing(&self) -> Result<(), SupervisorError> {
            if self.fail_playing {
                return Err(SupervisorError::StateChange { state: gst::State::Playing, detail: None });
            }
            self.states.borrow_mut().push(gst::State::Playing);
            Ok(())
        }

        fn set_null(&self) -> Result<(), SupervisorError> {
            self.states.borrow_mut().push(gst::State::Null);
            Ok(())
        }
    }

    /// Delivers a fixed sequence of events, like a bus that has these messages queued.
    struct ScriptedLoop {
        events: VecDeque<BusEvent>,
        dispatched: usize,
    }

    impl ScriptedLoop {
        fn new(events: Vec<BusEvent>) -> Self {
            ScriptedLoop { events: events.into(), dispatched: 0 }
        }
    }

    impl EventLoop for ScriptedLoop {
        fn run(&mut self, handler: BusHandler) -> Result<Termination, SupervisorError> {
            while let Some(event) = self.events.pop_front() {
                self.dispatched += 1;
                if let BusAction::Quit(termination) = handler(&event) {
                    return Ok(termination);
                }
            }
            Err(SupervisorError::LoopExited)
        }
    }

    struct PanickingLoop;

    impl EventLoop for PanickingLoop {
        fn run(&mut self, _handler: BusHandler) -> Result<Termination, SupervisorError> {
            panic!("handler blew up");
        }
    }

    fn warning() -> BusEvent {
        BusEvent::Warning { source: "src".to_owned(), error: "slow".to_owned(), debug: None }
    }

    #[test]
    fn end_of_stream_stops_within_one_dispatch() {
        let pipeline = FakePipeline::default();
        let mut event_loop = ScriptedLoop::new(vec![BusEvent::EndOfStream, warning()]);
        let termination = supervise(&pipeline, &mut event_loop).unwrap();
        assert_eq!(termination, Termination::EndOfStream);
        assert_eq!(event_loop.dispatched, 1);
        assert!(*pipeline.watched.borrow());
        assert_eq!(*pipeline.states.borrow(), vec![gst::State::Playing, gst::State::Null]);
    }

    #[test]
    fn warnings_do_not_stop_the_loop() {
        let pipeline = FakePipeline::default();
        let mut event_loop = ScriptedLoop::new(vec![warning(), BusEvent::Other, warning(), BusEvent::EndOfStream]);
        assert_eq!(supervise(&pipeline, &mut event_loop).unwrap(), Termination::EndOfStream);
        assert_eq!(event_loop.dispatched, 4);
    }

    #[test]
    fn error_stops_the_loop_and_tears_down() {
        let pipeline = FakePipeline::default();
        let error = BusEvent::Error {
            source: "pravegasrc".to_owned(),
            error: "stream not found".to_owned(),
            debug: Some("scope=myscope".to_owned()),
        };
        let mut event_loop = ScriptedLoop::new(vec![warning(), error, BusEvent::EndOfStream]);
        let termination = supervise(&pipeline, &mut event_loop).unwrap();
        assert_eq!(
            termination,
            Termination::Error { source: "pravegasrc".to_owned(), message: "stream not found".to_owned() }
        );
        assert_eq!(event_loop.dispatched, 2);
        assert_eq!(pipeline.last_state(), Some(gst::State::Null));
    }

    #[test]
    fn loop_error_is_returned_after_teardown() {
        let pipeline = FakePipeline::default();
        let mut event_loop = ScriptedLoop::new(vec![warning()]);
        let err = supervise(&pipeline, &mut event_loop).unwrap_err();
        assert!(matches!(err, SupervisorError::LoopExited));
        assert_eq!(pipeline.last_state(), Some(gst::State::Null));
    }

    #[test]
    fn panic_is_resumed_after_teardown() {
        let pipeline = FakePipeline::default();
        let result = panic::catch_unwind(AssertUnwindSafe(|| supervise(&pipeline, &mut PanickingLoop)));
        let payload = result.unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "handler blew up");
        assert_eq!(*pipeline.states.borrow(), vec![gst::State::Playing, gst::State::Null]);
    }

    #[test]
    fn failure_to_play_is_an_error() {
        let pipeline = FakePipeline { fail_playing: true, ..Default::default() };
        let mut event_loop = ScriptedLoop::new(vec![BusEvent::EndOfStream]);
        let err = supervise(&pipeline, &mut event_loop).unwrap_err();
        assert!(matches!(err, SupervisorError::StateChange { state: gst::State::Playing, .. }));
        assert_eq!(event_loop.dispatched, 0);
        assert_eq!(pipeline.last_state(), Some(gst::State::Null));
    }

    #[test]
    fn state_change_error_message() {
        let err = SupervisorError::StateChange { state: gst::State::Playing, detail: Some("no such file".to_owned()) };
        assert_eq!(err.to_string(), "Unable to set the pipeline to the `Playing` state: no such file");
        let err = SupervisorError::StateChange { state: gst::State::Null, detail: None };
        assert_eq!(err.to_string(), "Unable to set the pipeline to the `Null` state");
    }

    #[test]
    fn context_and_watch_errors_are_distinguished() {
        let err = SupervisorError::MainContext(glib::bool_error!("context is owned by another thread"));
        assert_eq!(err.to_string(), "Unable to acquire the event loop context: context is owned by another thread");
        let err = SupervisorError::from(glib::bool_error!("bus already has a watch"));
        assert!(matches!(err, SupervisorError::BusWatch(_)));
        assert_eq!(err.to_string(), "Unable to watch the pipeline bus: bus already has a watch");
    }

    #[test]
    fn context_owned_by_another_thread_is_reported() {
        gst::init().unwrap();
        let pipeline = gst::Pipeline::new();
        let mut event_loop = GstBusLoop::for_pipeline(&pipeline).unwrap();
        let context = event_loop.main_loop.context();
        let (acquired_tx, acquired_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let owner = std::thread::spawn(move || {
            let _guard = context.acquire().unwrap();
            acquired_tx.send(()).unwrap();
            let _ = release_rx.recv();
        });
        acquired_rx.recv().unwrap();
        let err = event_loop.run(handle_bus_event).unwrap_err();
        release_tx.send(()).unwrap();
        owner.join().unwrap();
        assert!(matches!(err, SupervisorError::MainContext(_)));
    }
}
