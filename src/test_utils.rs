pub fn init() {
    dotenvy::from_filename(".env").ok();
    env_logger::try_init().ok();
}
