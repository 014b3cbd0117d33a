//! Trampolined interpreter for transaction descriptions
//!
//! Evaluates one attempt of a [`Node`] tree against a [`Journal`]. The
//! interpreter is a single loop over an explicit continuation stack:
//! descending into a node pushes a [`Frame`], producing a value or an error
//! unwinds frames until one of them yields the next node to run.
//!
//! Evaluation is synchronous and never blocks. Its result tells the manager
//! what to do next: commit, propagate a failure, block, or restart.

use crate::journal::{Checkpoint, Journal};
use crate::stm::{Abort, AnyValue, BindFn, MapFn, Node};
use std::sync::Arc;
use tessel_core::StmConfig;

/// How one evaluation attempt ended
pub(crate) enum Exit {
    /// The transaction produced a value; the journal is ready to commit
    Succeed(AnyValue),
    /// The transaction failed with its typed error
    Fail(AnyValue),
    /// The transaction asked to block until a touched ref changes
    Retry,
    /// Mid-evaluation validation found a stale read
    Invalid,
}

enum Signal {
    Value(AnyValue),
    Error(AnyValue),
    Retry,
}

enum Frame {
    Map(MapFn),
    MapErr(MapFn),
    FlatMap(BindFn),
    Alternative {
        right: Arc<Node>,
        on_failure: bool,
        checkpoint: Checkpoint,
    },
    Catch {
        handler: BindFn,
        checkpoint: Checkpoint,
    },
    Fold {
        on_success: MapFn,
        on_failure: MapFn,
        checkpoint: Checkpoint,
    },
    Collect {
        nodes: Arc<[Arc<Node>]>,
        next: usize,
        values: Vec<AnyValue>,
    },
}

enum Step {
    Continue(Arc<Node>),
    Done(Exit),
}

/// Evaluate `root` once against `journal`
pub(crate) fn evaluate(root: &Arc<Node>, journal: &mut Journal, config: &StmConfig) -> Exit {
    let mut stack: Vec<Frame> = Vec::new();
    let mut current = Arc::clone(root);
    let mut steps: u64 = 0;

    loop {
        steps += 1;
        if config.validation_due(steps) && !journal.is_valid() {
            return Exit::Invalid;
        }

        let signal = match &*current {
            Node::Succeed(f) => Signal::Value(f()),
            Node::Fail(f) => Signal::Error(f()),
            Node::Retry => Signal::Retry,
            Node::Access(f) => match f(journal) {
                Ok(value) => Signal::Value(value),
                Err(Abort::Retry) => Signal::Retry,
                Err(Abort::Fail(error)) => Signal::Error(error),
            },
            Node::Suspend(f) => {
                current = f();
                continue;
            }
            Node::Map(inner, f) => {
                stack.push(Frame::Map(Arc::clone(f)));
                current = Arc::clone(inner);
                continue;
            }
            Node::MapErr(inner, f) => {
                stack.push(Frame::MapErr(Arc::clone(f)));
                current = Arc::clone(inner);
                continue;
            }
            Node::FlatMap(inner, f) => {
                stack.push(Frame::FlatMap(Arc::clone(f)));
                current = Arc::clone(inner);
                continue;
            }
            Node::Alternative {
                left,
                right,
                on_failure,
            } => {
                stack.push(Frame::Alternative {
                    right: Arc::clone(right),
                    on_failure: *on_failure,
                    checkpoint: journal.checkpoint(),
                });
                current = Arc::clone(left);
                continue;
            }
            Node::CatchAll(inner, handler) => {
                stack.push(Frame::Catch {
                    handler: Arc::clone(handler),
                    checkpoint: journal.checkpoint(),
                });
                current = Arc::clone(inner);
                continue;
            }
            Node::Fold {
                inner,
                on_success,
                on_failure,
            } => {
                stack.push(Frame::Fold {
                    on_success: Arc::clone(on_success),
                    on_failure: Arc::clone(on_failure),
                    checkpoint: journal.checkpoint(),
                });
                current = Arc::clone(inner);
                continue;
            }
            Node::Collect(nodes) => match nodes.first() {
                None => Signal::Value(Box::new(Vec::<AnyValue>::new())),
                Some(first) => {
                    let first = Arc::clone(first);
                    stack.push(Frame::Collect {
                        nodes: Arc::clone(nodes),
                        next: 1,
                        values: Vec::with_capacity(nodes.len()),
                    });
                    current = first;
                    continue;
                }
            },
        };

        match unwind(&mut stack, signal, journal) {
            Step::Continue(node) => current = node,
            Step::Done(exit) => return exit,
        }
    }
}

/// Pop frames until one yields the next node, or the stack is exhausted
fn unwind(stack: &mut Vec<Frame>, mut signal: Signal, journal: &mut Journal) -> Step {
    while let Some(frame) = stack.pop() {
        signal = match (frame, signal) {
            (Frame::Map(f), Signal::Value(value)) => Signal::Value(f(value)),
            (Frame::MapErr(f), Signal::Error(error)) => Signal::Error(f(error)),
            (Frame::FlatMap(f), Signal::Value(value)) => return Step::Continue(f(value)),

            (Frame::Collect { nodes, next, mut values }, Signal::Value(value)) => {
                values.push(value);
                match nodes.get(next) {
                    Some(node) => {
                        let node = Arc::clone(node);
                        stack.push(Frame::Collect {
                            nodes,
                            next: next + 1,
                            values,
                        });
                        return Step::Continue(node);
                    }
                    None => Signal::Value(Box::new(values)),
                }
            }

            (Frame::Alternative { checkpoint, .. }, Signal::Value(value)) => {
                journal.release(checkpoint);
                Signal::Value(value)
            }
            (
                Frame::Alternative {
                    right, checkpoint, ..
                },
                Signal::Retry,
            ) => {
                journal.rollback(checkpoint);
                return Step::Continue(right);
            }
            (
                Frame::Alternative {
                    right,
                    on_failure: true,
                    checkpoint,
                },
                Signal::Error(_),
            ) => {
                journal.rollback(checkpoint);
                return Step::Continue(right);
            }
            (Frame::Alternative { checkpoint, .. }, signal) => {
                journal.release(checkpoint);
                signal
            }

            (
                Frame::Catch {
                    handler,
                    checkpoint,
                },
                Signal::Error(error),
            ) => {
                journal.rollback(checkpoint);
                return Step::Continue(handler(error));
            }
            (Frame::Catch { checkpoint, .. }, signal) => {
                journal.release(checkpoint);
                signal
            }

            (
                Frame::Fold {
                    on_success,
                    checkpoint,
                    ..
                },
                Signal::Value(value),
            ) => {
                journal.release(checkpoint);
                Signal::Value(on_success(value))
            }
            (
                Frame::Fold {
                    on_failure,
                    checkpoint,
                    ..
                },
                Signal::Error(error),
            ) => {
                journal.rollback(checkpoint);
                Signal::Value(on_failure(error))
            }
            (Frame::Fold { checkpoint, .. }, signal) => {
                journal.release(checkpoint);
                signal
            }

            // Frames that do not handle this signal are skipped
            (_, signal) => signal,
        };
    }

    Step::Done(match signal {
        Signal::Value(value) => Exit::Succeed(value),
        Signal::Error(error) => Exit::Fail(error),
        Signal::Retry => Exit::Retry,
    })
}
