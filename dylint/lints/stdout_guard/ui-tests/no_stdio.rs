// Cases for NO_STDIO

fn writes_into_protocol_stream() {
    print!("OK ");
    println!("D 1234");
}

fn writes_to_stderr() {
    eprint!("pin: ");
    eprintln!("released");
}

fn dumps_a_value() {
    let settings = ("SETDESC", 42);
    dbg!(settings);
}

// Allowed: explicit stderr writes and tracing.
fn allowed() {
    use std::io::Write;
    let _ = writeln!(std::io::stderr(), "cannot open log file");
    tracing::info!("structured");
}

fn main() {
    writes_into_protocol_stream();
    writes_to_stderr();
    dumps_a_value();
    allowed();
}
