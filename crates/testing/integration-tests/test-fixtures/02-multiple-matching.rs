macro_rules! test {
    ($test:expr, $ty:ty) => (
      //X
        $test
        //^
    )
}
