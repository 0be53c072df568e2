macro_rules! test {
    ($test:expr) => (
      //X
        $test
        //^
    )
    ($test:expr) => (
        $test
    )
}
