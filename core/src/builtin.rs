//! Commands and flags the tree installs on its own: `--help`,
//! `--version`, the `help` command, and the hidden completion command.

use tracing::debug;

use crate::args::Args;
use crate::command::{ANNOTATION_SET_BY_FRAMEWORK, Command, CommandId, CommandTree};
use crate::completion::{COMPLETE_COMMAND, COMPLETE_NO_DESC_COMMAND, Completion};
use crate::context::Context;
use crate::directive::Directive;
use crate::error::{CommandError, Result};
use crate::flag::Flag;

const HELP_FLAG: &str = "help";
const VERSION_FLAG: &str = "version";

fn new_help_command(root_name: &str) -> Command {
    Command::new("help [command]")
        .with_short("Help about any command")
        .with_long(&format!(
            "Help provides help for any command in the application.\n\
             Simply type {root_name} help [path to command] for full details."
        ))
        .with_valid_args_function(|req| {
            let tree = req.tree();
            let Ok(found) = tree.find(req.args()) else {
                return (Vec::new(), Directive::NO_FILE_COMP);
            };
            let completions = tree
                .children(found.command)
                .into_iter()
                .filter(|child| tree.is_available(*child) || Some(*child) == tree.help_command())
                .map(|child| tree.command(child))
                .filter(|command| command.name().starts_with(req.to_complete()))
                .map(|command| Completion::with_description(command.name(), &command.short))
                .collect();
            (completions, Directive::NO_FILE_COMP)
        })
        .with_run(|inv| {
            let tree = inv.tree();
            match tree.find(inv.args()) {
                Ok(found) => inv.print(&tree.help_text(found.command)),
                Err(_) => {
                    inv.print(&format!("Unknown help topic {:?}\n", inv.args()));
                    inv.print(&format!("{}\n", tree.usage_text(tree.root())));
                }
            }
            Ok(())
        })
}

fn new_complete_command() -> Command {
    Command::new(&format!("{COMPLETE_COMMAND} [command-line]"))
        .with_alias(COMPLETE_NO_DESC_COMMAND)
        .with_short("Request shell completion choices for the specified command-line")
        .with_long(&format!(
            "{COMPLETE_COMMAND} is a special command that is used by the shell completion logic\n\
             to request completion choices for the specified command-line."
        ))
        .hidden()
        .disable_flag_parsing()
        .with_args(Args::Minimum(1))
        .with_valid_args_function(|_| (Vec::new(), Directive::NO_FILE_COMP))
}

impl CommandTree {
    /// Adds `--help`, and `--version` when the command carries a version,
    /// unless flags of those names are already visible. The `-h` and `-v`
    /// shorthands are only taken when free.
    ///
    /// # Errors
    ///
    /// Returns a flag declaration error.
    pub fn install_default_flags(&mut self, id: CommandId) -> Result<()> {
        let name = self.name(id).to_string();
        if self.lookup_flag(id, HELP_FLAG).is_none() {
            let mut flag = Flag::bool(HELP_FLAG)
                .with_usage(&format!("help for {name}"))
                .with_annotation(ANNOTATION_SET_BY_FRAMEWORK, &["true"]);
            if self.all_flags(id).lookup_shorthand('h').is_none() {
                flag = flag.with_shorthand('h');
            }
            self.add_flag(id, flag)?;
        }
        if self.command(id).version.is_some() && self.lookup_flag(id, VERSION_FLAG).is_none() {
            let mut flag = Flag::bool(VERSION_FLAG)
                .with_usage(&format!("version for {name}"))
                .with_annotation(ANNOTATION_SET_BY_FRAMEWORK, &["true"]);
            if self.all_flags(id).lookup_shorthand('v').is_none() {
                flag = flag.with_shorthand('v');
            }
            self.add_flag(id, flag)?;
        }
        Ok(())
    }

    /// Children of the root other than the built-in commands.
    fn has_user_commands(&self) -> bool {
        self.nodes[self.root.0]
            .children
            .iter()
            .any(|child| Some(*child) != self.help_command && Some(*child) != self.complete_command)
    }

    /// Installs the `help` command under a root with subcommands and
    /// keeps it listed last. A user command named `help` takes precedence.
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be attached.
    pub fn init_default_help_command(&mut self) -> Result<()> {
        if !self.has_user_commands() {
            return Ok(());
        }
        let user_help = self.nodes[self.root.0]
            .children
            .iter()
            .any(|child| Some(*child) != self.help_command && self.name(*child) == HELP_FLAG);
        if user_help {
            return Ok(());
        }
        let id = match self.help_command {
            Some(id) => id,
            None => {
                let id = self.insert_node(new_help_command(self.name(self.root)), None)?;
                debug!("Installed help command");
                self.help_command = Some(id);
                id
            }
        };
        self.remove_command(self.root, id);
        self.attach_command(self.root, id)
    }

    /// Attaches the hidden completion command and keeps it only if `args`
    /// select it.
    ///
    /// Returns `true` when the invocation is a completion request.
    pub(crate) fn prepare_complete_command(&mut self, args: &[String]) -> Result<bool> {
        let id = match self.complete_command {
            Some(id) => id,
            None => {
                let id = self.insert_node(new_complete_command(), None)?;
                self.complete_command = Some(id);
                id
            }
        };
        if self.parent(id).is_none() {
            self.attach_command(self.root, id)?;
        }
        let requested = matches!(self.find(args), Ok(found) if found.command == id);
        if !requested {
            self.remove_command(self.root, id);
        }
        Ok(requested)
    }

    /// Answers a completion request: everything after the completion
    /// command's name is the command line to complete.
    pub(crate) fn serve_completion_request(&mut self, args: &[String], context: &Context) -> Result<CommandId> {
        let found = self.find(args)?;
        let id = found.command;
        let invalid = self
            .command(id)
            .args
            .as_ref()
            .and_then(|rule| rule.validate(&found.args, &self.command_path(id), &[], &[]).err());
        if let Some(err) = invalid {
            let err = self.report_execution_error(id, CommandError::from(err));
            self.remove_command(self.root, id);
            return Err(err);
        }
        self.remove_command(self.root, id);

        let descriptions = found.called_as.as_deref() != Some(COMPLETE_NO_DESC_COMMAND);
        let outcome = self.complete(&found.args, context);
        debug!(
            command = %self.command_path(outcome.command),
            count = outcome.completions.len(),
            directive = outcome.directive.bits(),
            "Served completion request"
        );
        self.write_completions(&outcome, descriptions);
        Ok(id)
    }
}
