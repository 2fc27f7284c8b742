//! The main function for the Librarian terminal application

fn main() {
    // Optional, RUST_LOG may just as well come from the real environment
    dotenvy::dotenv().ok();
    librarian_lib::run();
}
