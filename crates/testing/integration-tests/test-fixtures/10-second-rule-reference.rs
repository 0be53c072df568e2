macro_rules! conv {
    ($t:expr) => { $t };
    ($t:expr, $u:ty) => {
             //X
        $t as $u
             //^
    };
}
