use clap::{
    builder::{
        styling::{AnsiColor, Effects, Styles},
        ValueParser,
    },
    Arg, ArgAction, ColorChoice, Command,
};

pub const ARG_API_URL: &str = "api-url";
pub const ARG_STATE_FILE: &str = "state-file";
pub const ARG_LOGIN_ROUTE: &str = "login-route";
pub const ARG_REDIRECT_DELAY_MS: &str = "redirect-delay-ms";
pub const ARG_AUTH_FAILURE_PATTERN: &str = "auth-failure-pattern";
pub const ARG_LOCATION: &str = "location";
pub const ARG_VERBOSITY: &str = "verbosity";

pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        if let Ok(parsed) = level.parse::<u8>() {
            // Successfully parsed as a number
            if parsed <= 5 {
                return Ok(parsed);
            }
        }

        match level.to_lowercase().as_str() {
            "error" => Ok(0),
            "warn" => Ok(1),
            "info" => Ok(2),
            "debug" => Ok(3),
            "trace" => Ok(4),
            _ => Err("invalid log level".to_string()),
        }
    })
}

pub fn validator_role() -> ValueParser {
    ValueParser::from(move |role: &str| -> std::result::Result<String, String> {
        crate::session::Role::parse(role)
            .map(|role| role.as_str().to_string())
            .ok_or_else(|| "role must be one of: etudiant, formateur, admin".to_string())
    })
}

fn login_command() -> Command {
    Command::new("login")
        .about("Open a session (development login by default)")
        .arg(
            Arg::new("role")
                .short('r')
                .long("role")
                .help("Role to sign in as: etudiant, formateur, admin")
                .required(true)
                .value_parser(validator_role()),
        )
        .arg(
            Arg::new("id")
                .long("id")
                .help("User id (defaults to the demo account of the role)"),
        )
        .arg(Arg::new("email").long("email").help("Email address"))
        .arg(Arg::new("nom").long("nom").help("Family name"))
        .arg(Arg::new("prenom").long("prenom").help("Given name"))
        .arg(
            Arg::new("matricule")
                .long("matricule")
                .help("Student registration number"),
        )
        .arg(
            Arg::new("specialite")
                .long("specialite")
                .help("Instructor specialty"),
        )
        .arg(
            Arg::new("user")
                .long("user")
                .help("Full identity record as JSON, replaces the demo account")
                .conflicts_with_all(["id", "email", "nom", "prenom", "matricule", "specialite"]),
        )
        .arg(
            Arg::new("token")
                .long("token")
                .help("Store this token as is instead of generating one"),
        )
}

pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    Command::new("scolaris")
        .about("School management client")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new(ARG_API_URL)
                .short('u')
                .long(ARG_API_URL)
                .help("Base URL of the school API")
                .default_value(crate::config::DEFAULT_API_BASE_URL)
                .env("SCOLARIS_API_URL")
                .global(true),
        )
        .arg(
            Arg::new(ARG_STATE_FILE)
                .long(ARG_STATE_FILE)
                .help("Where the session is persisted (defaults to the user data directory)")
                .env("SCOLARIS_STATE_FILE")
                .global(true),
        )
        .arg(
            Arg::new(ARG_LOGIN_ROUTE)
                .long(ARG_LOGIN_ROUTE)
                .help("Route users are sent to when their session ends")
                .default_value(crate::routes::LOGIN_ROUTE)
                .env("SCOLARIS_LOGIN_ROUTE")
                .global(true),
        )
        .arg(
            Arg::new(ARG_REDIRECT_DELAY_MS)
                .long(ARG_REDIRECT_DELAY_MS)
                .help("Delay before the login redirect after an authentication failure")
                .default_value("100")
                .env("SCOLARIS_REDIRECT_DELAY_MS")
                .global(true)
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_AUTH_FAILURE_PATTERN)
                .long(ARG_AUTH_FAILURE_PATTERN)
                .help("Regex matched against 401/403 bodies to detect token failures")
                .default_value(crate::config::DEFAULT_AUTH_FAILURE_PATTERN)
                .env("SCOLARIS_AUTH_FAILURE_PATTERN")
                .global(true),
        )
        .arg(
            Arg::new(ARG_LOCATION)
                .short('l')
                .long(ARG_LOCATION)
                .help("Route the client is currently showing")
                .default_value("/")
                .env("SCOLARIS_LOCATION")
                .global(true),
        )
        .arg(
            Arg::new(ARG_VERBOSITY)
                .short('v')
                .long("verbose")
                .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
                .env("SCOLARIS_LOG_LEVEL")
                .global(true)
                .action(ArgAction::Count)
                .value_parser(validator_log_level()),
        )
        .subcommand(login_command())
        .subcommand(Command::new("logout").about("Close the session"))
        .subcommand(Command::new("whoami").about("Show the signed-in user and token details"))
        .subcommand(
            Command::new("validate")
                .about("Check the stored token, regenerating it when malformed"),
        )
        .subcommand(
            Command::new("route")
                .about("Evaluate the route guard for a path")
                .arg(Arg::new("path").help("Route path, e.g. /etudiant/cours").required(true)),
        )
        .subcommand(Command::new("callback").about("Resolve the post-login redirect"))
        .subcommand(
            Command::new("get")
                .about("GET a backend path through the authenticated pipeline")
                .arg(Arg::new("path").help("Path relative to the API URL").required(true)),
        )
        .subcommand(
            Command::new("list")
                .about("Fetch a backend collection")
                .arg(
                    Arg::new("resource")
                        .help("cours, etudiants, groupes, specialites, seances-cours, notes")
                        .required(true),
                )
                .arg(
                    Arg::new("by")
                        .long("by")
                        .help("Lookup filter, e.g. id, code, matricule, a-venir, mes-notes"),
                )
                .arg(Arg::new("value").help("Value for the lookup filter").requires("by")),
        )
}
