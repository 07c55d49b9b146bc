fn main() {
    typeswap_cli::run_main();
}
