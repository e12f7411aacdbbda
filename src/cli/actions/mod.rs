pub mod admin;
pub mod server;

// The match over every `Action` lives in `run` so this file only lists variants.
mod run;

#[derive(Debug)]
pub enum Action {
    Server(server::Args),
    Admin(admin::Args),
}

impl Action {
    /// Execute the action.
    /// # Errors
    /// Returns an error if the action fails.
    pub async fn execute(self) -> anyhow::Result<()> {
        run::execute(self).await
    }
}
