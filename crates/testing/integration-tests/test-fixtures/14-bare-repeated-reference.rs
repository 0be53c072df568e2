macro_rules! test {
    ($($test:expr),+) => {
        $test
        //^ unresolved
    };
}
