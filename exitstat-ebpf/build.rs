use which::which;

/// Building the BPF target needs bpf-linker; fail early with a usable hint
/// instead of an obscure rustc error.
fn main() {
    if which("bpf-linker").is_err() {
        panic!("bpf-linker not found; install it with `cargo install bpf-linker`");
    }
}
