//! Send/Sync guarantees for types that cross thread boundaries.

use cdr_relay::delivery::DeliveryConfig;
use cdr_relay::{
    BoundedQueue, CallRecord, Daemon, DeliveryWorker, MockSource, PollSource, SerialLineSource,
    Settings, ShutdownSignal, SourceRegistry, TimeoutController,
};
use rstest::rstest;
use static_assertions::assert_impl_all;

#[rstest]
fn shared_handles_are_send_sync() {
    assert_impl_all!(BoundedQueue: Send, Sync, Clone);
    assert_impl_all!(ShutdownSignal: Send, Sync, Clone);
    assert_impl_all!(CallRecord: Send, Sync);
    assert_impl_all!(Settings: Send, Sync);
    assert_impl_all!(SourceRegistry: Send, Sync);
    assert_impl_all!(DeliveryConfig: Send, Sync);
}

#[rstest]
fn loop_owners_are_send() {
    assert_impl_all!(DeliveryWorker<TimeoutController>: Send);
    assert_impl_all!(SerialLineSource: Send);
    assert_impl_all!(MockSource: Send);
    assert_impl_all!(PollSource: Send);
    assert_impl_all!(Daemon: Send);
}
