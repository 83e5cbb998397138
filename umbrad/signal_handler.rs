//! Process signal wiring: SIGINT and SIGTERM invoke one registered closure,
//! concurrent deliveries are serialized through a mutex, and SIGPIPE is
//! ignored so peers closing sockets never kill the node.

use std::sync::Mutex;

static HANDLER: Mutex<Option<Box<dyn FnMut() + Send>>> = Mutex::new(None);

extern "C" fn on_signal(_signal: libc::c_int) {
    if let Ok(mut handler) = HANDLER.lock() {
        if let Some(handler) = handler.as_mut() {
            handler();
        }
    }
}

pub fn install(handler: Box<dyn FnMut() + Send>) {
    *HANDLER.lock().expect("signal handler mutex never poisons") = Some(handler);

    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = on_signal as libc::sighandler_t;
        libc::sigemptyset(&mut action.sa_mask);
        libc::sigaction(libc::SIGINT, &action, std::ptr::null_mut());
        libc::sigaction(libc::SIGTERM, &action, std::ptr::null_mut());

        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
    }
}
