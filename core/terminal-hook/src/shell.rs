//! Hook snippets printed by `aw-terminal-hook init <shell>`.
//!
//! Load with `eval "$(aw-terminal-hook init zsh)"` from the shell rc file.
//! Notifications for running commands are sent in the background; ordering is
//! restored by the watcher from their timestamps.

use clap::ValueEnum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
}

const BASH_SNIPPET: &str = r#"__aw_terminal_at_prompt=
__aw_terminal_running=
__aw_terminal_preexec() {
    [[ -n $COMP_LINE || -z $__aw_terminal_at_prompt ]] && return
    [[ $BASH_COMMAND == __aw_terminal* ]] && return
    __aw_terminal_at_prompt=
    __aw_terminal_running=1
    local cmd
    cmd=$(HISTTIMEFORMAT= builtin history 1 | sed 's/^ *[0-9]* *//')
    (aw-terminal-hook exec --pid $$ --shell bash --path "$PWD" --command "$cmd" >/dev/null 2>&1 &)
}
__aw_terminal_precmd() {
    if [[ -n $__aw_terminal_running ]]; then
        (aw-terminal-hook result --pid $$ --exit-code "$__aw_terminal_status" >/dev/null 2>&1 &)
    fi
    __aw_terminal_running=
    __aw_terminal_at_prompt=1
}
__aw_terminal_close() {
    aw-terminal-hook close --pid $$ >/dev/null 2>&1
}
trap '__aw_terminal_preexec' DEBUG
trap '__aw_terminal_close' EXIT
PROMPT_COMMAND="__aw_terminal_status=\$?${PROMPT_COMMAND:+; $PROMPT_COMMAND}; __aw_terminal_precmd"
aw-terminal-hook open --pid $$ >/dev/null 2>&1
"#;

const ZSH_SNIPPET: &str = r#"autoload -Uz add-zsh-hook
typeset -g __aw_terminal_running=
__aw_terminal_preexec() {
    __aw_terminal_running=1
    aw-terminal-hook exec --pid $$ --shell zsh --path "$PWD" --command "$1" >/dev/null 2>&1 &!
}
__aw_terminal_precmd() {
    local exit_code=$?
    if [[ -n $__aw_terminal_running ]]; then
        aw-terminal-hook result --pid $$ --exit-code "$exit_code" >/dev/null 2>&1 &!
    fi
    __aw_terminal_running=
}
__aw_terminal_close() {
    aw-terminal-hook close --pid $$ >/dev/null 2>&1
}
add-zsh-hook preexec __aw_terminal_preexec
add-zsh-hook precmd __aw_terminal_precmd
add-zsh-hook zshexit __aw_terminal_close
aw-terminal-hook open --pid $$ >/dev/null 2>&1
"#;

pub fn snippet(shell: Shell) -> &'static str {
    match shell {
        Shell::Bash => BASH_SNIPPET,
        Shell::Zsh => ZSH_SNIPPET,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippets_report_every_lifecycle_transition() {
        for shell in [Shell::Bash, Shell::Zsh] {
            let text = snippet(shell);
            for subcommand in ["open", "exec", "result", "close"] {
                assert!(
                    text.contains(&format!("aw-terminal-hook {} --pid $$", subcommand)),
                    "{:?} snippet missing {}",
                    shell,
                    subcommand
                );
            }
        }
    }

    #[test]
    fn snippets_pass_their_shell_name() {
        assert!(snippet(Shell::Bash).contains("--shell bash"));
        assert!(snippet(Shell::Zsh).contains("--shell zsh"));
    }
}
