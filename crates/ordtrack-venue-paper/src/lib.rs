//! In-process paper venue.
//!
//! [`PaperVenue`] implements [`ProtocolEngine`]: `transmit` queues the
//! request on a channel and returns immediately. A dispatch thread applies
//! each request to a [`PaperBook`] and delivers the resulting
//! acknowledgments to the attached [`InboundHandler`], the same way a real
//! session's reader thread would.
//!
//! The handler is held weakly, so a session that owns the venue can attach
//! itself without a reference cycle. Acknowledgments produced while no
//! handler is attached are dropped.

use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Context, Result};
use crossbeam::channel::{unbounded, Receiver, Sender};
use ordtrack_execution::{ClOrdId, InboundHandler, OutboundAction, ProtocolEngine};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info};

mod book;

pub use book::{PaperBehavior, PaperBook, VenueOrder};

enum Command {
    Request(OutboundAction),
    Fill(ClOrdId, i64),
}

type HandlerSlot = Arc<RwLock<Option<Weak<dyn InboundHandler>>>>;

pub struct PaperVenue {
    tx: Mutex<Option<Sender<Command>>>,
    handler: HandlerSlot,
    book: Arc<Mutex<PaperBook>>,
    journal: Mutex<Vec<OutboundAction>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl PaperVenue {
    /// Start the dispatch thread.
    pub fn spawn(behavior: PaperBehavior) -> Result<Self> {
        let (tx, rx) = unbounded();
        let handler: HandlerSlot = Arc::new(RwLock::new(None));
        let book = Arc::new(Mutex::new(PaperBook::new(behavior)));

        let worker = {
            let handler = handler.clone();
            let book = book.clone();
            thread::Builder::new()
                .name("paper-venue".to_string())
                .spawn(move || dispatch_loop(rx, book, handler))
                .context("spawn paper venue dispatch thread")?
        };

        Ok(Self {
            tx: Mutex::new(Some(tx)),
            handler,
            book,
            journal: Mutex::new(Vec::new()),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Route acknowledgments to `handler` from now on.
    pub fn attach(&self, handler: Weak<dyn InboundHandler>) {
        *self.handler.write() = Some(handler);
    }

    /// Fill `qty` of the order currently addressed by `id`, asynchronously.
    pub fn fill(&self, id: &ClOrdId, qty: i64) -> Result<()> {
        self.send(Command::Fill(id.clone(), qty))
    }

    /// Every request accepted by `transmit`, in order.
    pub fn transmitted(&self) -> Vec<OutboundAction> {
        self.journal.lock().clone()
    }

    /// Read the venue-side book.
    pub fn with_book<R>(&self, f: impl FnOnce(&PaperBook) -> R) -> R {
        f(&self.book.lock())
    }

    /// Stop accepting requests and wait for queued ones to be delivered.
    pub fn shutdown(&self) {
        self.tx.lock().take();
        let Some(handle) = self.worker.lock().take() else {
            return;
        };
        // The last session reference can be released on the dispatch thread.
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            error!("paper venue dispatch thread panicked");
        }
    }

    fn send(&self, cmd: Command) -> Result<()> {
        let guard = self.tx.lock();
        let tx = guard
            .as_ref()
            .ok_or_else(|| anyhow!("paper venue is shut down"))?;
        tx.send(cmd).map_err(|_| anyhow!("paper venue dispatch thread is gone"))
    }
}

impl ProtocolEngine for PaperVenue {
    fn transmit(&self, action: &OutboundAction) -> Result<()> {
        self.send(Command::Request(action.clone()))?;
        self.journal.lock().push(action.clone());
        Ok(())
    }
}

impl Drop for PaperVenue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn dispatch_loop(rx: Receiver<Command>, book: Arc<Mutex<PaperBook>>, handler: HandlerSlot) {
    info!("paper venue started");
    for cmd in rx.iter() {
        let (reports, delay) = {
            let mut book = book.lock();
            let reports = match cmd {
                Command::Request(action) => book.handle(&action),
                Command::Fill(id, qty) => book.fill(&id, qty).into_iter().collect(),
            };
            (reports, book.behavior().ack_delay)
        };
        if reports.is_empty() {
            continue;
        }
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        let target = handler.read().as_ref().and_then(Weak::upgrade);
        let Some(target) = target else {
            debug!(dropped = reports.len(), "no handler attached");
            continue;
        };
        for report in reports {
            target.on_execution_report(report);
        }
    }
    info!("paper venue stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use ordtrack_execution::{AckKind, ExecutionReport, NewOrderSingle, Side, TimeInForce};
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct Collector(Mutex<Vec<ExecutionReport>>);

    impl InboundHandler for Collector {
        fn on_execution_report(&self, report: ExecutionReport) {
            self.0.lock().push(report);
        }
    }

    impl Collector {
        fn wait_len(&self, n: usize) -> Vec<ExecutionReport> {
            let deadline = Instant::now() + Duration::from_secs(2);
            while Instant::now() < deadline {
                if self.0.lock().len() >= n {
                    break;
                }
                thread::sleep(Duration::from_millis(2));
            }
            self.0.lock().clone()
        }
    }

    fn new_order(cl: &str) -> OutboundAction {
        OutboundAction::New(NewOrderSingle {
            cl_ord_id: ClOrdId::new(cl),
            symbol: "SYM".into(),
            side: Side::Sell,
            quantity: 1,
            price: Some(600_000),
            time_in_force: TimeInForce::Day,
            account: None,
            security_sub_type: None,
        })
    }

    #[test]
    fn acks_reach_the_attached_handler() {
        let venue = PaperVenue::spawn(PaperBehavior::default()).unwrap();
        let sink = Arc::new(Collector::default());
        let weak: Weak<dyn InboundHandler> = Arc::downgrade(&sink) as Weak<dyn InboundHandler>;
        venue.attach(weak);

        venue.transmit(&new_order("c1")).unwrap();
        let got = sink.wait_len(1);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].kind, AckKind::New);
        assert_eq!(venue.transmitted().len(), 1);
    }

    #[test]
    fn acks_without_handler_are_dropped() {
        let venue = PaperVenue::spawn(PaperBehavior::default()).unwrap();
        venue.transmit(&new_order("c1")).unwrap();
        venue.shutdown();
        assert_eq!(venue.with_book(|b| b.working_count()), 1);
    }

    #[test]
    fn transmit_after_shutdown_fails() {
        let venue = PaperVenue::spawn(PaperBehavior::default()).unwrap();
        venue.shutdown();
        let err = venue.transmit(&new_order("c1")).unwrap_err();
        assert!(err.to_string().contains("shut down"));
    }

    #[test]
    fn fill_is_delivered() {
        let venue = PaperVenue::spawn(PaperBehavior::default()).unwrap();
        let sink = Arc::new(Collector::default());
        venue.attach(Arc::downgrade(&sink) as Weak<dyn InboundHandler>);

        venue.transmit(&new_order("c1")).unwrap();
        venue.fill(&ClOrdId::new("c1"), 1).unwrap();
        let got = sink.wait_len(2);
        assert_eq!(got[1].kind, AckKind::Fill);
        assert_eq!(got[1].last_qty, Some(1));
    }
}
