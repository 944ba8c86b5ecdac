//! Behavior of the virtual-time event kernel.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use dagsim::sim::Sim;

fn secs(s: f64) -> Duration {
    Duration::from_secs_f64(s)
}

#[test]
fn time_starts_at_zero_and_advances_with_sleeps() {
    let sim = Sim::new();
    assert_eq!(sim.now(), Duration::ZERO);

    let observed = Rc::new(RefCell::new(Vec::new()));
    {
        let sim2 = sim.clone();
        let observed = Rc::clone(&observed);
        sim.spawn(async move {
            sim2.sleep(secs(3.0)).await;
            observed.borrow_mut().push(sim2.now().as_secs_f64());
            sim2.sleep(secs(2.0)).await;
            observed.borrow_mut().push(sim2.now().as_secs_f64());
        });
    }
    sim.run();

    assert_eq!(*observed.borrow(), vec![3.0, 5.0]);
    assert_eq!(sim.now(), secs(5.0));
}

#[test]
fn sleepers_wake_in_deadline_then_spawn_order() {
    let sim = Sim::new();
    let order = Rc::new(RefCell::new(Vec::new()));

    for (name, delay) in [("late", 4.0), ("early", 1.0), ("tied-a", 2.0), ("tied-b", 2.0)] {
        let sim2 = sim.clone();
        let order = Rc::clone(&order);
        sim.spawn(async move {
            sim2.sleep(secs(delay)).await;
            order.borrow_mut().push(name);
        });
    }
    sim.run();

    // Equal deadlines resolve in timer registration order.
    assert_eq!(*order.borrow(), vec!["early", "tied-a", "tied-b", "late"]);
}

#[test]
fn all_ready_processes_run_before_time_advances() {
    let sim = Sim::new();
    let (tx, mut rx) = mpsc::unbounded_channel::<u32>();
    let seen = Rc::new(RefCell::new(Vec::new()));

    {
        let sim2 = sim.clone();
        let seen = Rc::clone(&seen);
        sim.spawn(async move {
            while let Some(value) = rx.recv().await {
                // The sender never slept, so no time may have passed.
                assert_eq!(sim2.now(), Duration::ZERO);
                seen.borrow_mut().push(value);
                if value == 2 {
                    break;
                }
            }
        });
    }
    {
        let sim2 = sim.clone();
        sim.spawn(async move {
            tx.send(1).unwrap();
            tx.send(2).unwrap();
            sim2.sleep(secs(10.0)).await;
        });
    }
    sim.run();

    assert_eq!(*seen.borrow(), vec![1, 2]);
    assert_eq!(sim.now(), secs(10.0));
}

#[test]
fn run_returns_at_quiescence_with_parked_receivers() {
    let sim = Sim::new();
    let (_tx, mut rx) = mpsc::unbounded_channel::<u32>();
    sim.spawn(async move {
        // Never receives anything; abandoned at quiescence.
        let _ = rx.recv().await;
        panic!("parked process must not be woken");
    });
    {
        let sim2 = sim.clone();
        sim.spawn(async move {
            sim2.sleep(secs(1.5)).await;
        });
    }
    sim.run();
    assert_eq!(sim.now(), secs(1.5));
}

#[test]
fn oneshot_interrupts_a_sleeping_process() {
    let sim = Sim::new();
    let (cancel_tx, mut cancel_rx) = oneshot::channel::<&'static str>();
    let outcome = Rc::new(RefCell::new(None));

    {
        let sim2 = sim.clone();
        let outcome = Rc::clone(&outcome);
        sim.spawn(async move {
            tokio::select! {
                biased;
                cause = &mut cancel_rx => {
                    *outcome.borrow_mut() = Some((cause.unwrap(), sim2.now().as_secs_f64()));
                }
                _ = sim2.sleep(secs(100.0)) => {
                    *outcome.borrow_mut() = Some(("finished", sim2.now().as_secs_f64()));
                }
            }
        });
    }
    {
        let sim2 = sim.clone();
        sim.spawn(async move {
            sim2.sleep(secs(7.0)).await;
            let _ = cancel_tx.send("killed");
        });
    }
    sim.run();

    assert_eq!(*outcome.borrow(), Some(("killed", 7.0)));
}

#[test]
fn processes_spawned_mid_run_are_polled() {
    let sim = Sim::new();
    let done = Rc::new(RefCell::new(false));
    {
        let sim2 = sim.clone();
        let done = Rc::clone(&done);
        sim.spawn(async move {
            sim2.sleep(secs(1.0)).await;
            let sim3 = sim2.clone();
            let done = Rc::clone(&done);
            sim2.spawn(async move {
                sim3.sleep(secs(1.0)).await;
                *done.borrow_mut() = true;
            });
        });
    }
    sim.run();
    assert!(*done.borrow());
    assert_eq!(sim.now(), secs(2.0));
}
