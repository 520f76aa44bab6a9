fn main() -> Result<(), Box<dyn std::error::Error>> {
    gxd_cache::app::run_cache_load(std::env::args().skip(1))
}
