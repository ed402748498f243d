//! Build script for the devcfg ESP32 firmware.

fn main() {
    // Required for esp-idf-svc to find the IDF toolchain
    embuild::espidf::sysenv::output();
}
