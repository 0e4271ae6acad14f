//! `tandem state`: inspect or erase the persisted stack.

use anyhow::{Context, Result};
use tandem::config::cfg;
use tandem::log;
use tandem::persist::StateFileOwner;

use super::StateAction;

pub fn state(action: StateAction) -> Result<()> {
    let owner = StateFileOwner::new(&cfg().state.dir);
    match action {
        StateAction::Show => {
            let Some(state) = owner.try_read()? else {
                log!("state"; "nothing persisted at {}", owner.path().display());
                return Ok(());
            };
            let json = serde_json::to_string_pretty(&state)?;
            println!("{json}");
        }
        StateAction::Erase => {
            owner
                .erase_stack()
                .with_context(|| format!("failed to erase {}", owner.path().display()))?;
            log!("state"; "stack erased");
        }
    }
    Ok(())
}
