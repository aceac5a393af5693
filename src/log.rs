use std::sync::atomic::Ordering;

use chrono::Local;

use crate::DEBUG_PARSE;

/// Форматированный лог с временной меткой
pub fn log_line(msg: &str) {
    let now = Local::now().format("%H:%M:%S");
    println!("{} {}", now, msg);
}

/// Лог отправки LCP опции
pub fn log_send_lcp(id: u8, option_type: u8, data: &[u8]) {
    log_line(&format!(
        "Send LCP #{} Option={} Data={}",
        id,
        option_type,
        hex::encode_upper(data)
    ));
}

/// Лог получения LCP опции
pub fn log_recv_lcp(id: u8, option_type: u8, data: &[u8]) {
    log_line(&format!(
        "Received LCP *{} Option={} Data={}",
        id,
        option_type,
        hex::encode_upper(data)
    ));
}

/// Hex dump of a raw frame, only when DEBUG_PARSE is switched on.
pub fn log_frame(label: &str, packet: &[u8]) {
    if DEBUG_PARSE.load(Ordering::Relaxed) {
        log_line(&format!(
            "{} ({} байт): {}",
            label,
            packet.len(),
            hex::encode_upper(packet)
        ));
    }
}
