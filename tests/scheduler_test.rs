// Frame task scheduling driven through a live host.

mod test_helpers;

use std::sync::{Arc, Mutex};
use std::thread;

use test_helpers::{test_host, FakeEngine};
use vadrigar::{Event, EventName, HookReply, Plugin, PluginApi, Priority};

#[test]
fn test_background_tasks_run_in_order_on_the_sim_thread() {
    let engine = FakeEngine::new();
    let mut host = test_host(engine);
    let handle = host.task_handle();

    let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    // A background thread enqueues two immediate tasks and one delayed
    // by five frames; enqueueing never blocks it.
    let worker_log = log.clone();
    let worker = thread::spawn(move || {
        let l = worker_log.clone();
        handle.next_frame(move |_| l.lock().unwrap().push("first"));
        let l = worker_log.clone();
        handle.next_frame(move |_| l.lock().unwrap().push("second"));
        let l = worker_log.clone();
        handle.defer(5, move |_| l.lock().unwrap().push("delayed"));
    });
    worker.join().unwrap();

    // Both zero-delay tasks run on the next frame, in enqueue order.
    host.handle_frame();
    assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);

    // The delayed one stays put for five frames.
    for _ in 0..4 {
        host.handle_frame();
    }
    assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);

    host.handle_frame();
    assert_eq!(*log.lock().unwrap(), vec!["first", "second", "delayed"]);
}

#[test]
fn test_tasks_drain_before_frame_event() {
    let engine = FakeEngine::new();
    let mut host = test_host(engine);

    let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    struct FrameWatcher {
        order: Arc<Mutex<Vec<&'static str>>>,
    }
    impl Plugin for FrameWatcher {
        fn name(&self) -> &'static str {
            "frame_watcher"
        }
        fn on_load(&mut self, api: &mut PluginApi<'_>) -> anyhow::Result<()> {
            let order = self.order.clone();
            api.add_hook(
                EventName::Frame,
                Priority::Normal,
                Box::new(move |_| {
                    order.lock().unwrap().push("frame_hook");
                    Ok(HookReply::Pass)
                }),
            );
            Ok(())
        }
    }

    let factory_order = order.clone();
    host.register_plugin(
        "frame_watcher",
        Box::new(move || {
            Box::new(FrameWatcher {
                order: factory_order.clone(),
            })
        }),
    );
    host.load_plugin("frame_watcher").unwrap();

    let task_order = order.clone();
    host.task_handle()
        .next_frame(move |_| task_order.lock().unwrap().push("task"));

    host.handle_frame();
    assert_eq!(*order.lock().unwrap(), vec!["task", "frame_hook"]);
}

#[test]
fn test_panicking_task_does_not_block_later_tasks() {
    let engine = FakeEngine::new();
    let mut host = test_host(engine);

    let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let handle = host.task_handle();

    handle.next_frame(|_| panic!("task gone wrong"));
    let l = log.clone();
    handle.next_frame(move |_| l.lock().unwrap().push("survivor"));

    host.handle_frame();
    assert_eq!(*log.lock().unwrap(), vec!["survivor"]);
}

#[test]
fn test_deferred_reentry_can_manage_plugins() {
    // The scheduler is the sanctioned way back into host state: a task
    // may load plugins, which a hook or command handler cannot.
    struct Latecomer;
    impl Plugin for Latecomer {
        fn name(&self) -> &'static str {
            "latecomer"
        }
        fn on_load(&mut self, _api: &mut PluginApi<'_>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    let engine = FakeEngine::new();
    let mut host = test_host(engine);
    host.register_plugin("latecomer", Box::new(|| Box::new(Latecomer)));

    host.task_handle().next_frame(|host| {
        host.load_plugin("latecomer").unwrap();
    });

    assert!(!host.is_plugin_loaded("latecomer"));
    host.handle_frame();
    assert!(host.is_plugin_loaded("latecomer"));
}

#[test]
fn test_frame_event_dispatches_every_frame() {
    let engine = FakeEngine::new();
    let mut host = test_host(engine);

    let count = Arc::new(Mutex::new(0u32));

    struct Counter {
        count: Arc<Mutex<u32>>,
    }
    impl Plugin for Counter {
        fn name(&self) -> &'static str {
            "counter"
        }
        fn on_load(&mut self, api: &mut PluginApi<'_>) -> anyhow::Result<()> {
            let count = self.count.clone();
            api.add_hook(
                EventName::Frame,
                Priority::Normal,
                Box::new(move |event| {
                    assert!(matches!(event, Event::Frame));
                    *count.lock().unwrap() += 1;
                    Ok(HookReply::Pass)
                }),
            );
            Ok(())
        }
    }

    let factory_count = count.clone();
    host.register_plugin(
        "counter",
        Box::new(move || {
            Box::new(Counter {
                count: factory_count.clone(),
            })
        }),
    );
    host.load_plugin("counter").unwrap();

    for _ in 0..3 {
        host.handle_frame();
    }
    assert_eq!(*count.lock().unwrap(), 3);
    assert_eq!(host.current_frame(), 3);
}
