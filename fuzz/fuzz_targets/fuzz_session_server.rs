//! Fuzz target feeding arbitrary request frames through a live server.
//!
//! Every frame must produce a reply frame; decoded commands run against a
//! real handler, so this also exercises dispatch on hostile payloads.

#![no_main]

use std::sync::{Arc, OnceLock};

use kana_core::engine::{DictionaryBuilder, Engine};
use kana_core::platform::AlwaysAlive;
use kana_core::scheduler::Scheduler;
use kana_core::session::{SessionHandler, SessionHandlerConfig};
use kana_core::SessionServer;
use libfuzzer_sys::fuzz_target;

fn server() -> &'static SessionServer {
    static SERVER: OnceLock<SessionServer> = OnceLock::new();
    SERVER.get_or_init(|| {
        let engine = Engine::from_default(&DictionaryBuilder).expect("default engine");
        let handler = SessionHandler::new(Arc::new(engine), SessionHandlerConfig::default())
            .with_liveness(Arc::new(AlwaysAlive));
        SessionServer::new(handler, Arc::new(Scheduler::new()))
    })
}

fuzz_target!(|data: &[u8]| {
    let reply = server().process(data);
    assert!(reply.is_ok());
});
