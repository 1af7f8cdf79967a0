// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Actor registry behaviour through the global registry.
//!
//! These tests share process-wide state and run serially.

use serial_test::serial;
use std::thread;
use std::time::Duration;

use streamlib_dataflow::{
    ActorStub, ActorUri, PortSpec, ProcessContext, Result, StreamError, StreamHandler,
    StreamRuntime, registry, video_input, video_output,
};

struct Camera;

impl StreamHandler for Camera {
    fn ports(&self) -> Vec<PortSpec> {
        vec![video_output("video")]
    }

    fn process(&mut self, _ctx: &mut ProcessContext<'_>) -> Result<()> {
        Ok(())
    }
}

struct Monitor;

impl StreamHandler for Monitor {
    fn ports(&self) -> Vec<PortSpec> {
        vec![video_input("video").with_capabilities(streamlib_dataflow::Capabilities::DEVICE)]
    }

    fn process(&mut self, _ctx: &mut ProcessContext<'_>) -> Result<()> {
        Ok(())
    }
}

#[test]
#[serial]
fn test_handlers_register_and_unregister_on_stop() {
    registry::init();

    let mut rt = StreamRuntime::new(60.0).unwrap();
    let cam = rt.add_handler_with_id("front", Camera).unwrap();
    rt.add_handler(Monitor).unwrap();
    rt.connect(&cam.output("video"), &"monitor_0.video".parse().unwrap())
        .unwrap();

    let uri: ActorUri = "streamlib://local/Camera/front".parse().unwrap();
    let actor = registry::lookup(&uri).expect("camera should be registered");
    assert_eq!(actor.handler_id(), cam.id());
    assert!(!actor.is_running());

    // Adapters are not registered.
    assert_eq!(registry::global_registry().len(), 2);
    assert!(registry::find_by_class("HostToDeviceAdapter").is_empty());

    rt.start().unwrap();
    thread::sleep(Duration::from_millis(100));
    assert!(registry::lookup(&uri).unwrap().is_running());

    let via_localhost: ActorUri = "streamlib://localhost/Camera/front".parse().unwrap();
    assert!(registry::lookup(&via_localhost).is_some());

    rt.stop().unwrap();
    assert!(registry::lookup(&uri).is_none());
    assert!(registry::global_registry().is_empty());

    registry::teardown();
}

#[test]
#[serial]
fn test_duplicate_uri_rejected_across_runtimes() {
    registry::init();

    let mut first = StreamRuntime::new(30.0).unwrap();
    let mut second = StreamRuntime::new(30.0).unwrap();
    first.add_handler_with_id("cam", Camera).unwrap();

    let err = second.add_handler_with_id("cam", Camera).unwrap_err();
    assert!(matches!(err, StreamError::DuplicateUri(_)));

    // Same instance id under another class is a different URI.
    second.add_handler_with_id("cam", Monitor).unwrap();
    assert_eq!(registry::find_by_instance_id("cam").len(), 2);

    drop(first);
    drop(second);
    assert!(registry::global_registry().is_empty());

    registry::teardown();
}

#[test]
#[serial]
fn test_unregister_unknown_uri_fails() {
    registry::init();

    let uri = ActorUri::local("Camera", "ghost").unwrap();
    assert!(matches!(
        registry::unregister(&uri),
        Err(StreamError::UriNotFound(_))
    ));

    let mut rt = StreamRuntime::new(30.0).unwrap();
    let cam = rt.add_handler_with_id("ghost", Camera).unwrap();
    let uri = rt.handler_uri(cam.id()).unwrap().clone();
    registry::unregister(&uri).unwrap();
    assert!(registry::unregister(&uri).is_err());

    // Stopping tolerates a handler that was already unregistered.
    rt.stop().unwrap();

    registry::teardown();
}

#[test]
#[serial]
fn test_connect_actor_local_and_remote() {
    registry::init();

    let mut rt = StreamRuntime::new(30.0).unwrap();
    rt.add_handler_with_id("cam", Camera).unwrap();

    match registry::connect_actor("streamlib://127.0.0.1/Camera/cam").unwrap() {
        ActorStub::Local(stub) => assert_eq!(stub.actor().class_name(), "Camera"),
        ActorStub::Remote(_) => panic!("loopback should resolve locally"),
    }

    match registry::connect_actor("streamlib://studio-b.example/Camera/cam").unwrap() {
        ActorStub::Remote(stub) => {
            assert_eq!(stub.host(), "studio-b.example");
            assert!(!stub.is_running());
        }
        ActorStub::Local(_) => panic!("remote host should not resolve locally"),
    }

    assert!(matches!(
        registry::connect_actor("streamlib://local/Camera/missing"),
        Err(StreamError::UriNotFound(_))
    ));
    assert!(matches!(
        registry::connect_actor("http://local/Camera/cam"),
        Err(StreamError::InvalidUri(_))
    ));

    rt.stop().unwrap();
    registry::teardown();
}
