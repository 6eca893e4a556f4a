//! Shared fixtures for the queue integration tests
#![allow(dead_code, clippy::expect_used)]

pub mod mock_nsqd;

use std::sync::Arc;

use mailqueue_common::{Address, AddressList, Envelope, Message};
use mailqueue_queue::{Enqueuer, QueueContext, Remover, TestBus, TestRecordStore};
use mailqueue_store::TestBlobStore;

pub const RAW: &str = "Return-Path: <bounce@src.example>\r\n\
                       From: Sender <from@src.example>\r\n\
                       Subject: Test\r\n\
                       \r\n\
                       Hello\r\n";

pub const RAW_WITHOUT_RETURN_PATH: &str = "From: from@src.example\r\nSubject: Test\r\n\r\nHello\r\n";

/// Test adapters wired into one context, with handles kept for assertions
pub struct Harness {
    pub store: TestBlobStore,
    pub records: TestRecordStore,
    pub bus: TestBus,
    pub ctx: QueueContext,
}

impl Harness {
    pub fn new() -> Self {
        let store = TestBlobStore::new();
        let records = TestRecordStore::new();
        let bus = TestBus::new();
        let ctx = QueueContext::new(
            Arc::new(store.clone()),
            Arc::new(records.clone()),
            Arc::new(bus.clone()),
        );

        Self {
            store,
            records,
            bus,
            ctx,
        }
    }

    pub fn enqueuer(&self) -> Enqueuer {
        Enqueuer::new(self.ctx.clone())
    }

    pub fn remover(&self) -> Remover {
        Remover::new(self.ctx.clone())
    }
}

pub fn message(raw: &str) -> Message {
    Message::parse(raw.as_bytes().to_vec()).expect("valid test message")
}

pub fn envelope(from: &str, to: &[&str]) -> Envelope {
    let sender = (!from.is_empty()).then(|| from.parse::<Address>().expect("valid sender"));
    let recipients: AddressList = to
        .iter()
        .map(|rcpt| rcpt.parse::<Address>().expect("valid recipient"))
        .collect();

    Envelope::new(sender, recipients)
}
