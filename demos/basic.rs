use cofuture::{Executor, ThreadPoolExecutor};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::try_init().ok();

    let pool = ThreadPoolExecutor::new(4, Some("demo"));
    let results: Vec<i32> = pool
        .map(validate, vec![1, 2, 10], None)?
        .collect::<Result<_, _>>()?;
    println!("all positive: {results:?}");

    match pool.map(validate, vec![1, 2, -3, 10], None)?.collect::<Result<Vec<_>, _>>() {
        Err(err) => println!("some negative: {err}"),
        Ok(_) => anyhow::bail!("expected an error"),
    }

    Ok(())
}

fn validate(input: i32) -> i32 {
    if input < 0 {
        panic!("input out of range: {input}");
    }
    input
}
