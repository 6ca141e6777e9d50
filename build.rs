fn main() {
    // ESP-IDF environment for esp-idf-sys; host builds need nothing.
    #[cfg(feature = "esp32")]
    embuild::espidf::sysenv::output();
}
