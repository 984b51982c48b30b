#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // The server parses untrusted client frames; a successful parse also
    // checks that move indices stay within the 9x9 grid on re-validation.
    if let Ok(message) = serde_json::from_slice::<supertac::protocol::ClientMessage>(data) {
        if let supertac::protocol::ClientMessage::MakeMove { mv, .. } = message {
            let mut board = supertac::board::GlobalBoard::default();
            let _ = board.place(mv, supertac::board::Mark::X);
        }
    }
});
