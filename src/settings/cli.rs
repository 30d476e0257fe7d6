use super::Parser;

#[derive(Parser, Debug)]
#[command(name = "gatehouse", about = "Login, logout, register and refresh endpoints")]
pub struct Cli {
    /// Path to a settings TOML file.
    #[arg(long)]
    pub settings: Option<String>,
}
