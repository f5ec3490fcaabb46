use thiserror::Error;

use crate::action::{Action, EditOp};
use crate::parse::Command;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("line {line}: unknown command {name:?}")]
    UnknownCommand { line: usize, name: String },
    #[error("line {line}: edit requires an action parameter")]
    MissingEditAction { line: usize },
    #[error("line {line}: unknown edit action {action:?} (expected writeAll, change, insert, append or delete)")]
    UnknownEditAction { line: usize, action: String },
}

/// Map a parsed command onto the action it describes.
pub fn dispatch(cmd: &Command) -> Result<Action, DispatchError> {
    let line = cmd.line_no;
    let action = match cmd.name.to_ascii_lowercase().as_str() {
        "modify" => Action::Modify(cmd.clone()),
        "rewrite" => Action::Rewrite(cmd.clone()),
        "create" => Action::Create(cmd.clone()),
        "delete" => Action::Delete(cmd.clone()),
        "exec" => Action::Exec(cmd.clone()),
        "edit" => {
            let requested = cmd
                .param_payload("action")
                .ok_or(DispatchError::MissingEditAction { line })?;
            let op = EditOp::from_name(requested).ok_or_else(|| DispatchError::UnknownEditAction {
                line,
                action: requested.to_string(),
            })?;
            Action::Edit(op, cmd.clone())
        }
        _ => {
            return Err(DispatchError::UnknownCommand {
                line,
                name: cmd.name.clone(),
            })
        }
    };
    log::trace!("line {line}: dispatched {}", action.kind());
    Ok(action)
}

/// Dispatch every command, keeping source order.
pub fn dispatch_all(commands: &[Command]) -> Result<Vec<Action>, DispatchError> {
    commands.iter().map(dispatch).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_str;

    fn kinds(text: &str) -> Vec<String> {
        let cmds = parse_str(text).unwrap();
        dispatch_all(&cmds).unwrap().iter().map(Action::kind).collect()
    }

    #[test]
    fn maps_names_case_insensitively() {
        let text = ":Modify a\n:REWRITE b\n:create c\n:Delete d\n:exec ls\n";
        assert_eq!(kinds(text), vec!["modify", "rewrite", "create", "delete", "exec"]);
    }

    #[test]
    fn edit_sub_actions() {
        let text = ":edit a\n$action writeAll\n\
                    :edit a\n$action Change\n\
                    :edit a\n$action INSERT\n\
                    :edit a\n$action append\n\
                    :edit a\n$action delete\n";
        assert_eq!(
            kinds(text),
            vec!["edit:writeAll", "edit:change", "edit:insert", "edit:append", "edit:delete"]
        );
    }

    #[test]
    fn dispatch_errors() {
        let cmds = parse_str(":frobnicate x\n").unwrap();
        assert_eq!(
            dispatch(&cmds[0]).unwrap_err(),
            DispatchError::UnknownCommand {
                line: 1,
                name: "frobnicate".into()
            }
        );

        let cmds = parse_str("\n:edit a\n$content x\n").unwrap();
        assert_eq!(
            dispatch(&cmds[0]).unwrap_err(),
            DispatchError::MissingEditAction { line: 2 }
        );

        let cmds = parse_str(":edit a\n$action replaceAll\n").unwrap();
        assert!(matches!(
            dispatch(&cmds[0]),
            Err(DispatchError::UnknownEditAction { action, .. }) if action == "replaceAll"
        ));
    }

    #[test]
    fn repeated_edits_dispatch_separately() {
        let text = ":edit f.txt\n\
                    $action change\n$search a\n$content b\n\
                    $action change\n$search c\n$content d\n";
        let cmds = parse_str(text).unwrap();
        let actions = dispatch_all(&cmds).unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[1].command().param_payload("search"), Some("c"));
    }
}
