//! Interactive prompt handling

/// Prompt shown before each input line
pub const PROMPT: &str = "0-takeoff, 1-land, 2-end, run, photo, video, stream, track, sleep, or a Tello command? ";

pub const HELP: &str = "\
Control a Tello drone from the command line or a command file. Available commands:
  0              - takeoff
  1              - land
  2 | end        - end and exit
  p[hoto]        - take a picture (yyyy-mmdd-hhmmss.png)
  v[ideo]        - start/stop recording (yyyy-mmdd-hhmmss.mjpeg)
  s[tream]       - start/stop the live preview
  t[rack]        - start/stop motion tracking
  run <file>     - execute commands from a file (default: telloCommands.txt)
  sleep <sec>    - sleep in seconds (default: 1.0)
  repeat <cmd>   - start/stop repeating a command
  rc <a> <b> <c> <d> - remote control: left/right, forward/back, up/down, yaw
  reboot         - restart the drone
  help | ?       - print this help
  or a Tello command like \"up 20\", \"left 50\", \"cw 90\", \"flip l\", \"battery?\"";

/// What an input line asks the prompt to do
#[derive(Debug, Clone, PartialEq)]
pub enum Input<'a> {
    Quit,
    Help,
    /// Toggle repetition of the command
    Repeat(&'a str),
    Rc([i32; 4]),
    Reboot,
    /// Hand the line to the executor
    Execute(&'a str),
}

pub fn interpret(line: &str) -> Input<'_> {
    let line = line.trim();
    let lowered = line.to_lowercase();

    match lowered.as_str() {
        "" | "2" | "end" | "quit" | "exit" => return Input::Quit,
        "?" | "help" => return Input::Help,
        "0" => return Input::Execute("takeoff"),
        "1" => return Input::Execute("land"),
        "reboot" => return Input::Reboot,
        _ => {}
    }

    if lowered.starts_with("repeat ") {
        if let Some(command) = line.get("repeat ".len()..).map(str::trim) {
            if !command.is_empty() {
                return Input::Repeat(command);
            }
        }
    }
    if let Some(values) = parse_rc(&lowered) {
        return Input::Rc(values);
    }
    Input::Execute(line)
}

/// `rc a b c d` with four integers
fn parse_rc(line: &str) -> Option<[i32; 4]> {
    let mut parts = line.split_whitespace();
    if parts.next()? != "rc" {
        return None;
    }
    let mut values = [0i32; 4];
    for value in values.iter_mut() {
        *value = parts.next()?.parse().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases() {
        assert_eq!(interpret("0"), Input::Execute("takeoff"));
        assert_eq!(interpret(" 1 "), Input::Execute("land"));
        assert_eq!(interpret("2"), Input::Quit);
        assert_eq!(interpret("END"), Input::Quit);
        assert_eq!(interpret(""), Input::Quit);
        assert_eq!(interpret("?"), Input::Help);
        assert_eq!(interpret("help"), Input::Help);
    }

    #[test]
    fn test_commands_pass_through() {
        assert_eq!(interpret("flip l"), Input::Execute("flip l"));
        assert_eq!(interpret("battery?"), Input::Execute("battery?"));
        assert_eq!(interpret("run Mission.txt"), Input::Execute("run Mission.txt"));
    }

    #[test]
    fn test_repeat() {
        assert_eq!(interpret("repeat forward 20"), Input::Repeat("forward 20"));
        assert_eq!(interpret("repeat "), Input::Execute("repeat"));
    }

    #[test]
    fn test_rc() {
        assert_eq!(interpret("rc 10 -20 0 5"), Input::Rc([10, -20, 0, 5]));
        assert_eq!(interpret("rc 10 20"), Input::Execute("rc 10 20"));
        assert_eq!(interpret("rc a b c d"), Input::Execute("rc a b c d"));
        assert_eq!(interpret("Reboot"), Input::Reboot);
    }
}
