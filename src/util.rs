const FLEETMON_CONFIG: &str = "FLEETMON_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "./fleetmon.json";

/// Config path from the environment, used when no `-f` flag is given
pub fn get_config_path() -> String {
    std::env::var(FLEETMON_CONFIG).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
}

/// Random 32-byte agent secret, hex encoded
pub fn generate_secret() -> String {
    let bytes: [u8; 32] = rand::random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
